//! Load-aware scheduling library
//!
//! This crate provides:
//! - Pod usage estimation from declared requests and limits
//! - Tracking of pods assigned since the last node telemetry report
//! - Load-aware filtering and weighted least-allocated node scoring
//! - Batch-tier admission across both generations of batch resource names
//! - Health checks and observability for the scheduler host

pub mod batch;
pub mod config;
pub mod estimator;
pub mod expiration;
pub mod extension;
pub mod framework;
pub mod health;
pub mod models;
pub mod observability;
pub mod plugins;
pub mod quantity;
pub mod scorer;
pub mod tracker;

pub use config::{ConfigError, LoadAwareArgs};
pub use framework::{
    ClusterStore, Code, FilterPlugin, ListerError, NodeInfoLister, NodeMetricLister, Plugin,
    PluginError, ReservePlugin, ScorePlugin, Status,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SchedulerMetrics, StructuredLogger};
pub use plugins::{BatchResourceFit, LoadAwareScheduling};
pub use quantity::{Quantity, QuantityError, ResourceList, ResourceName};
pub use tracker::{PodAssignCache, PodEvent, PodEventHandler};
