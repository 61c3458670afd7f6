//! Batch-tier admission filter plugin

use crate::batch::fits_request;
use crate::framework::{FilterPlugin, NodeInfoLister, Plugin, PluginError, Status};
use crate::models::Pod;
use std::sync::Arc;
use tracing::debug;

pub struct BatchResourceFit {
    node_infos: Arc<dyn NodeInfoLister>,
}

impl BatchResourceFit {
    pub const NAME: &'static str = "BatchResourceFit";

    pub fn new(node_infos: Arc<dyn NodeInfoLister>) -> Self {
        Self { node_infos }
    }
}

impl Plugin for BatchResourceFit {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl FilterPlugin for BatchResourceFit {
    fn filter(&self, pod: &Pod, node_name: &str) -> Status {
        let node_info = match self.node_infos.node_info(node_name) {
            Ok(info) => info,
            Err(source) if source.is_not_found() => {
                return Status::error(PluginError::NodeNotFound(node_name.to_string()))
            }
            Err(source) => {
                return Status::error(PluginError::NodeInfo {
                    node: node_name.to_string(),
                    source,
                })
            }
        };

        let insufficient = fits_request(pod, &node_info);
        if insufficient.is_empty() {
            return Status::success();
        }

        for r in &insufficient {
            debug!(
                pod = %pod.key(),
                node = %node_name,
                resource = %r.resource_name,
                requested = r.requested,
                used = r.used,
                capacity = r.capacity,
                "Insufficient batch resource"
            );
        }
        Status::unschedulable_with(insufficient.into_iter().map(|r| r.reason).collect())
    }
}
