//! Pod lifecycle event handling
//!
//! Keeps the assignment cache in step with the cluster: pods that finish,
//! get deleted or move away stop counting against their old node.

use super::PodAssignCache;
use crate::models::Pod;
use crate::observability::SchedulerMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Pod lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PodEvent {
    /// A pod appeared
    Added { pod: Pod },
    /// A pod object changed
    Updated { old: Pod, new: Pod },
    /// A pod was removed
    Deleted { pod: Pod },
}

impl PodEvent {
    /// Apply this event to the cache
    pub fn apply(self, cache: &PodAssignCache) {
        match self {
            PodEvent::Added { pod } => {
                if pod.is_assigned() {
                    let node = pod.node_name.clone();
                    cache.assign(&node, Arc::new(pod));
                }
            }
            PodEvent::Updated { old, new } => {
                if !new.is_assigned() {
                    if old.is_assigned() {
                        cache.unassign(&old.node_name, &old);
                    }
                } else if new.is_terminated() {
                    cache.unassign(&new.node_name, &new);
                } else {
                    let node = new.node_name.clone();
                    cache.assign(&node, Arc::new(new));
                }
            }
            // The record may sit on a node other than the one the object names
            PodEvent::Deleted { pod } => cache.remove_pod(&pod),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PodEvent::Added { .. } => "added",
            PodEvent::Updated { .. } => "updated",
            PodEvent::Deleted { .. } => "deleted",
        }
    }
}

/// Drains pod events from a channel into the assignment cache
pub struct PodEventHandler {
    cache: Arc<PodAssignCache>,
    events_rx: mpsc::Receiver<PodEvent>,
    metrics: Option<SchedulerMetrics>,
}

impl PodEventHandler {
    /// Create a handler and the sender used to feed it
    pub fn new(cache: Arc<PodAssignCache>, buffer_size: usize) -> (Self, mpsc::Sender<PodEvent>) {
        let (events_tx, events_rx) = mpsc::channel(buffer_size);
        (
            Self {
                cache,
                events_rx,
                metrics: None,
            },
            events_tx,
        )
    }

    pub fn with_metrics(mut self, metrics: SchedulerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Apply events until shutdown or until every sender is dropped.
    /// Returns the number of events applied.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!("Starting pod event handler");
        let mut applied = 0u64;

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        debug!("Pod event channel closed");
                        break;
                    };
                    let kind = event.kind();
                    debug!(kind, "Applying pod event");
                    event.apply(&self.cache);
                    applied += 1;

                    if let Some(metrics) = &self.metrics {
                        metrics.inc_pod_events(kind);
                        metrics.set_tracked_assignments(self.cache.len());
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down pod event handler");
                    break;
                }
            }
        }

        applied
    }
}
