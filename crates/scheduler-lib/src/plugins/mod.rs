//! Scheduling plugins

mod batch_resource;
mod load_aware;

pub use batch_resource::BatchResourceFit;
pub use load_aware::{usage_threshold_reason, LoadAwareScheduling, REASON_NODE_METRIC_EXPIRED};
