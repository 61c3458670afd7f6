//! Pending pod assignment cache
//!
//! Remembers pods the scheduler has placed on a node until the pod leaves
//! the node, so scoring can account for pods the latest telemetry snapshot
//! has not seen yet.

use crate::estimator::{estimate_pod_usage, Estimate};
use crate::expiration::report_interval;
use crate::extension::ResourceTranslator;
use crate::models::{NodeMetric, Pod};
use crate::quantity::ResourceName;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A pod placed on a node, with the time the scheduler placed it
#[derive(Debug, Clone)]
pub struct AssignRecord {
    pub pod: Arc<Pod>,
    pub node_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// node name -> records in assignment order
    nodes: HashMap<String, Vec<AssignRecord>>,
    /// pod uid -> node holding its record
    locations: HashMap<String, String>,
}

impl CacheState {
    fn remove(&mut self, node_name: &str, uid: &str) -> bool {
        let Some(records) = self.nodes.get_mut(node_name) else {
            return false;
        };
        let before = records.len();
        records.retain(|r| r.pod.uid != uid);
        let removed = records.len() != before;
        if records.is_empty() {
            self.nodes.remove(node_name);
        }
        if removed {
            self.locations.remove(uid);
        }
        removed
    }
}

/// Node -> pending assignment records, guarded by one reader/writer lock
#[derive(Debug, Default)]
pub struct PodAssignCache {
    state: RwLock<CacheState>,
}

impl PodAssignCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record that `pod` is placed on `node_name`, stamped with the current time
    pub fn assign(&self, node_name: &str, pod: Arc<Pod>) {
        self.assign_at(node_name, pod, Utc::now());
    }

    /// Record a placement with an explicit timestamp.
    ///
    /// Re-assigning a pod to the node it already occupies refreshes the pod
    /// object but keeps the original timestamp. Assigning it to a different
    /// node moves the record. Unbound or terminated pods are ignored.
    pub fn assign_at(&self, node_name: &str, pod: Arc<Pod>, timestamp: DateTime<Utc>) {
        if node_name.is_empty() || pod.is_terminated() {
            return;
        }

        let mut state = self.write();
        if let Some(previous) = state.locations.get(&pod.uid).cloned() {
            if previous == node_name {
                if let Some(record) = state
                    .nodes
                    .get_mut(node_name)
                    .and_then(|records| records.iter_mut().find(|r| r.pod.uid == pod.uid))
                {
                    record.pod = pod;
                }
                return;
            }
            state.remove(&previous, &pod.uid);
            debug!(pod = %pod.key(), from = %previous, to = %node_name, "Moving pod assignment");
        }

        state
            .locations
            .insert(pod.uid.clone(), node_name.to_string());
        state
            .nodes
            .entry(node_name.to_string())
            .or_default()
            .push(AssignRecord {
                pod,
                node_name: node_name.to_string(),
                timestamp,
            });
    }

    /// Forget `pod`'s placement on `node_name`. No-op if it is not recorded there.
    pub fn unassign(&self, node_name: &str, pod: &Pod) {
        let mut state = self.write();
        if state.remove(node_name, &pod.uid) {
            debug!(pod = %pod.key(), node = %node_name, "Removed pod assignment");
        }
    }

    /// Forget `pod` wherever it is recorded
    pub fn remove_pod(&self, pod: &Pod) {
        let mut state = self.write();
        if let Some(node_name) = state.locations.get(&pod.uid).cloned() {
            state.remove(&node_name, &pod.uid);
            debug!(pod = %pod.key(), node = %node_name, "Removed pod assignment");
        }
    }

    /// Node currently holding `uid`'s record
    pub fn node_of(&self, uid: &str) -> Option<String> {
        self.read().locations.get(uid).cloned()
    }

    /// Snapshot of the records held for a node, in assignment order
    pub fn records(&self, node_name: &str) -> Vec<AssignRecord> {
        self.read()
            .nodes
            .get(node_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of tracked assignments across all nodes
    pub fn len(&self) -> usize {
        self.read().locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated usage of the pods on `node_name` that `metric` cannot have
    /// observed yet.
    ///
    /// A record counts when it was placed after the snapshot's update time,
    /// or less than one report interval before it. Without an update time
    /// every record counts.
    pub fn estimated_assigned_usage(
        &self,
        node_name: &str,
        metric: &NodeMetric,
        weights: &BTreeMap<ResourceName, i64>,
        scaling_factors: &BTreeMap<ResourceName, i64>,
        translator: &ResourceTranslator,
    ) -> Estimate {
        let interval = report_interval(metric);
        let mut total = Estimate::new();

        let state = self.read();
        let Some(records) = state.nodes.get(node_name) else {
            return total;
        };

        for record in records {
            let pending = match metric.update_time {
                Some(update_time) => {
                    record.timestamp > update_time
                        || (record.timestamp < update_time
                            && update_time - record.timestamp < interval)
                }
                None => true,
            };
            if !pending {
                continue;
            }

            let estimated = estimate_pod_usage(&record.pod, weights, scaling_factors, translator);
            for (resource, value) in estimated {
                *total.entry(resource).or_insert(0) += value;
            }
        }

        total
    }
}
