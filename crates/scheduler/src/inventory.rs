//! Cluster inventory loading
//!
//! The inventory is a JSON snapshot of nodes, node telemetry and pods used to
//! seed the in-memory cluster state at startup.

use anyhow::{Context, Result};
use scheduler_lib::{ClusterStore, Node, NodeMetric, Pod, PodAssignCache, PodEvent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub node_metrics: Vec<NodeMetric>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub nodes: usize,
    pub node_metrics: usize,
    pub bound_pods: usize,
    pub skipped_pods: usize,
}

impl Inventory {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse inventory {}", path.display()))
    }

    /// Seed the store and the assignment cache. Bound pods are charged to
    /// their node and tracked; terminated pods and pods on unknown nodes are
    /// skipped.
    pub fn load_into(self, store: &ClusterStore, cache: &PodAssignCache) -> InventorySummary {
        let mut summary = InventorySummary {
            nodes: self.nodes.len(),
            node_metrics: self.node_metrics.len(),
            ..Default::default()
        };

        for node in self.nodes {
            store.upsert_node(node);
        }
        for metric in self.node_metrics {
            store.upsert_node_metric(metric);
        }

        for pod in self.pods {
            if !pod.is_assigned() || pod.is_terminated() {
                continue;
            }
            if let Err(err) = store.place_pod(&pod, &pod.node_name) {
                warn!(pod = %pod.key(), error = %err, "Skipping pod bound to unknown node");
                summary.skipped_pods += 1;
                continue;
            }
            PodEvent::Added { pod }.apply(cache);
            summary.bound_pods += 1;
        }

        summary
    }
}
