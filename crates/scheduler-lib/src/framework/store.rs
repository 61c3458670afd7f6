//! In-memory cluster state
//!
//! Holds node objects, telemetry snapshots and the requests of pods placed
//! on each node. Backs both lister traits for the host and for tests.

use super::{ListerError, NodeInfoLister, NodeMetricLister};
use crate::estimator::pod_requests;
use crate::models::{Node, NodeInfo, NodeMetric, Pod};
use crate::quantity::ResourceList;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreState {
    nodes: HashMap<String, NodeInfo>,
    metrics: HashMap<String, NodeMetric>,
    /// uid -> (node, requests charged to that node)
    placed: HashMap<String, (String, ResourceList)>,
}

#[derive(Debug, Default)]
pub struct ClusterStore {
    state: RwLock<StoreState>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a node object, keeping its requested totals
    pub fn upsert_node(&self, node: Node) {
        let mut state = self.write();
        match state.nodes.get_mut(&node.name) {
            Some(info) => info.node = node,
            None => {
                state.nodes.insert(node.name.clone(), NodeInfo::new(node));
            }
        }
    }

    pub fn remove_node(&self, node_name: &str) -> bool {
        let mut state = self.write();
        state.placed.retain(|_, (node, _)| node != node_name);
        state.metrics.remove(node_name);
        state.nodes.remove(node_name).is_some()
    }

    pub fn upsert_node_metric(&self, metric: NodeMetric) {
        self.write()
            .metrics
            .insert(metric.node_name.clone(), metric);
    }

    pub fn remove_node_metric(&self, node_name: &str) -> bool {
        self.write().metrics.remove(node_name).is_some()
    }

    /// Charge a pod's requests to `node_name`. A pod already placed elsewhere
    /// is released from its previous node first.
    pub fn place_pod(&self, pod: &Pod, node_name: &str) -> Result<(), ListerError> {
        let mut state = self.write();
        if !state.nodes.contains_key(node_name) {
            return Err(ListerError::NotFound {
                kind: "node",
                name: node_name.to_string(),
            });
        }

        if let Some((previous, requests)) = state.placed.remove(&pod.uid) {
            if let Some(info) = state.nodes.get_mut(&previous) {
                info.remove_requests(&requests);
            }
        }

        let requests = pod_requests(pod);
        if let Some(info) = state.nodes.get_mut(node_name) {
            info.add_requests(&requests);
        }
        state
            .placed
            .insert(pod.uid.clone(), (node_name.to_string(), requests));
        Ok(())
    }

    /// Release a pod's requests. No-op if the pod was never placed.
    pub fn release_pod(&self, pod: &Pod) -> bool {
        let mut state = self.write();
        let Some((node_name, requests)) = state.placed.remove(&pod.uid) else {
            return false;
        };
        if let Some(info) = state.nodes.get_mut(&node_name) {
            info.remove_requests(&requests);
        }
        true
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn metric_count(&self) -> usize {
        self.read().metrics.len()
    }
}

impl NodeMetricLister for ClusterStore {
    fn node_metric(&self, node_name: &str) -> Result<NodeMetric, ListerError> {
        self.read()
            .metrics
            .get(node_name)
            .cloned()
            .ok_or_else(|| ListerError::NotFound {
                kind: "nodemetric",
                name: node_name.to_string(),
            })
    }
}

impl NodeInfoLister for ClusterStore {
    fn node_info(&self, node_name: &str) -> Result<NodeInfo, ListerError> {
        self.read()
            .nodes
            .get(node_name)
            .cloned()
            .ok_or_else(|| ListerError::NotFound {
                kind: "node",
                name: node_name.to_string(),
            })
    }

    fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().nodes.keys().cloned().collect();
        names.sort();
        names
    }
}
