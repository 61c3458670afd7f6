//! Core data models for the scheduling plugins
//!
//! These are the slices of the cluster object model the plugins read:
//! pods with their container resources, nodes with allocatable capacity,
//! and the node telemetry snapshots reported by node agents.

use crate::quantity::{Quantity, ResourceList};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requests and limits declared by a single container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

/// A container in a pod spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// Lifecycle phase of a pod
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// A schedulable workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub uid: String,
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Numeric priority resolved from the pod's priority class
    #[serde(default)]
    pub priority: Option<i32>,
    /// Node the pod is bound to, empty when unscheduled
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
    #[serde(default)]
    pub overhead: Option<ResourceList>,
    #[serde(default)]
    pub phase: PodPhase,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Pod {
    /// `namespace/name` identifier used in logs and API responses
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_assigned(&self) -> bool {
        !self.node_name.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// A cluster node as seen by the scheduler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub allocatable: ResourceList,
}

/// Scheduler-side view of a node: the node object plus the total requests of
/// pods already placed on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: Node,
    #[serde(default)]
    pub requested: ResourceList,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            requested: ResourceList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Whole-unit allocatable amount for an extended resource, if declared
    pub fn allocatable_scalar(&self, resource: &str) -> Option<i64> {
        self.node.allocatable.get(resource).map(Quantity::value)
    }

    /// Whole-unit requested amount for an extended resource, if any pod requests it
    pub fn requested_scalar(&self, resource: &str) -> Option<i64> {
        self.requested.get(resource).map(Quantity::value)
    }

    /// Add a pod's requests to the node's requested totals
    pub fn add_requests(&mut self, requests: &ResourceList) {
        for (name, quantity) in requests {
            let entry = self.requested.entry(name.clone()).or_default();
            *entry = entry.saturating_add(*quantity);
        }
    }

    /// Release a pod's requests; totals that drop to zero are removed
    pub fn remove_requests(&mut self, requests: &ResourceList) {
        for (name, quantity) in requests {
            if let Some(entry) = self.requested.get_mut(name) {
                *entry = entry.saturating_sub(*quantity);
                if entry.is_zero() {
                    self.requested.remove(name);
                }
            }
        }
    }
}

/// Telemetry collection policy declared by the node agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectPolicy {
    #[serde(default)]
    pub report_interval_seconds: Option<i64>,
}

/// Usage reported by the node agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUsage {
    #[serde(default)]
    pub resources: ResourceList,
}

/// Point-in-time node telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetric {
    pub node_name: String,
    #[serde(default)]
    pub collect_policy: Option<CollectPolicy>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
    /// Absent until the agent has reported usage at least once
    #[serde(default)]
    pub node_usage: Option<NodeUsage>,
}

impl NodeMetric {
    /// Reported usage for a resource, zero if not reported
    pub fn usage(&self, resource: &str) -> Quantity {
        self.node_usage
            .as_ref()
            .and_then(|u| u.resources.get(resource).copied())
            .unwrap_or_default()
    }
}
