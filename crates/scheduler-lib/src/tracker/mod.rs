//! Tracking of pods assigned to nodes but not yet visible in node telemetry
//!
//! The cache is built once per scheduler instance and shared by reference
//! between the load-aware plugin (reserve/unreserve/score) and the pod
//! lifecycle event handler.

mod cache;
mod events;

pub use cache::{AssignRecord, PodAssignCache};
pub use events::{PodEvent, PodEventHandler};
