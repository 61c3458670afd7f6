//! Scheduling framework seams
//!
//! The host drives plugins through these traits and hands them read access
//! to cluster state through the lister traits. Plugins never perform I/O of
//! their own.

mod store;

pub use store::ClusterStore;

use crate::models::{NodeInfo, NodeMetric, Pod};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome class of a plugin call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Success,
    Unschedulable,
    Error,
}

/// Result of a filter or reserve call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: Code,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Unschedulable,
            reasons: vec![reason.into()],
        }
    }

    pub fn unschedulable_with(reasons: Vec<String>) -> Self {
        Self {
            code: Code::Unschedulable,
            reasons,
        }
    }

    pub fn error(err: impl fmt::Display) -> Self {
        Self {
            code: Code::Error,
            reasons: vec![err.to_string()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.reasons.join(", "))
        }
    }
}

/// Lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListerError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("lister unavailable: {0}")]
    Unavailable(String),
}

impl ListerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ListerError::NotFound { .. })
    }
}

/// Plugin call failures
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("node not found")]
    NodeNotFound(String),

    #[error("failed to get node metric for node {node}: {source}")]
    NodeMetric {
        node: String,
        #[source]
        source: ListerError,
    },

    #[error("failed to get node info for node {node}: {source}")]
    NodeInfo {
        node: String,
        #[source]
        source: ListerError,
    },
}

/// Telemetry snapshot lookup by node name
pub trait NodeMetricLister: Send + Sync {
    fn node_metric(&self, node_name: &str) -> Result<NodeMetric, ListerError>;
}

/// Node object lookup by node name
pub trait NodeInfoLister: Send + Sync {
    fn node_info(&self, node_name: &str) -> Result<NodeInfo, ListerError>;

    fn node_names(&self) -> Vec<String>;
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

pub trait FilterPlugin: Plugin {
    fn filter(&self, pod: &Pod, node_name: &str) -> Status;
}

pub trait ScorePlugin: Plugin {
    fn score(&self, pod: &Pod, node_name: &str) -> Result<i64, PluginError>;
}

pub trait ReservePlugin: Plugin {
    fn reserve(&self, pod: &Pod, node_name: &str) -> Status;

    fn unreserve(&self, pod: &Pod, node_name: &str);
}
