//! Batch-tier resource accounting
//!
//! Batch pods are admitted against the node's batch allocatable, a separate
//! pool from `cpu`/`memory`. Both naming generations of the batch resources
//! are reconciled here and nowhere else:
//!
//! - capacity (node allocatable, pod demand): the current name overwrites the
//!   legacy one, since both describe the same single ceiling
//! - usage (node requested): both names are summed, since pods admitted under
//!   either name still hold their share

use crate::estimator::pod_requests;
use crate::extension::{BATCH_CPU, BATCH_MEMORY, LEGACY_BATCH_CPU, LEGACY_BATCH_MEMORY};
use crate::models::{NodeInfo, Pod};
use crate::quantity::{ResourceList, ResourceName};
use serde::{Deserialize, Serialize};

pub const REASON_INSUFFICIENT_BATCH_CPU: &str = "Insufficient batch cpu";
pub const REASON_INSUFFICIENT_BATCH_MEMORY: &str = "Insufficient batch memory";

/// Batch-tier footprint: milli-cores and bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResource {
    pub milli_cpu: i64,
    pub memory: i64,
}

impl BatchResource {
    pub fn is_zero(&self) -> bool {
        self.milli_cpu == 0 && self.memory == 0
    }
}

/// One violated batch constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientResource {
    pub resource_name: ResourceName,
    pub reason: String,
    pub requested: i64,
    pub used: i64,
    pub capacity: i64,
}

/// Single ceiling declared under either name; the current name wins
pub fn reconcile_capacity(legacy: Option<i64>, current: Option<i64>) -> i64 {
    current.or(legacy).unwrap_or(0)
}

/// Usage held under both names; the amounts add up
pub fn reconcile_usage(legacy: Option<i64>, current: Option<i64>) -> i64 {
    legacy.unwrap_or(0) + current.unwrap_or(0)
}

fn scalar(list: &ResourceList, resource: &str) -> Option<i64> {
    list.get(resource).map(|q| q.value())
}

/// Batch demand of a pod, aggregated like its regular requests
pub fn pod_batch_request(pod: &Pod) -> BatchResource {
    let requests = pod_requests(pod);
    BatchResource {
        milli_cpu: reconcile_capacity(
            scalar(&requests, LEGACY_BATCH_CPU),
            scalar(&requests, BATCH_CPU),
        ),
        memory: reconcile_capacity(
            scalar(&requests, LEGACY_BATCH_MEMORY),
            scalar(&requests, BATCH_MEMORY),
        ),
    }
}

/// Batch capacity a node offers
pub fn node_batch_allocatable(node_info: &NodeInfo) -> BatchResource {
    BatchResource {
        milli_cpu: reconcile_capacity(
            node_info.allocatable_scalar(LEGACY_BATCH_CPU),
            node_info.allocatable_scalar(BATCH_CPU),
        ),
        memory: reconcile_capacity(
            node_info.allocatable_scalar(LEGACY_BATCH_MEMORY),
            node_info.allocatable_scalar(BATCH_MEMORY),
        ),
    }
}

/// Batch amounts already requested by pods on a node
pub fn node_batch_requested(node_info: &NodeInfo) -> BatchResource {
    BatchResource {
        milli_cpu: reconcile_usage(
            node_info.requested_scalar(LEGACY_BATCH_CPU),
            node_info.requested_scalar(BATCH_CPU),
        ),
        memory: reconcile_usage(
            node_info.requested_scalar(LEGACY_BATCH_MEMORY),
            node_info.requested_scalar(BATCH_MEMORY),
        ),
    }
}

/// Check a pod's batch demand against a node. Empty means the pod fits.
///
/// Pods without batch demand always fit. CPU and memory are checked
/// independently and every violation is reported.
pub fn fits_request(pod: &Pod, node_info: &NodeInfo) -> Vec<InsufficientResource> {
    let request = pod_batch_request(pod);
    if request.is_zero() {
        return Vec::new();
    }

    let requested = node_batch_requested(node_info);
    let allocatable = node_batch_allocatable(node_info);
    let mut insufficient = Vec::with_capacity(2);

    if request.milli_cpu > allocatable.milli_cpu - requested.milli_cpu {
        insufficient.push(InsufficientResource {
            resource_name: BATCH_CPU.to_string(),
            reason: REASON_INSUFFICIENT_BATCH_CPU.to_string(),
            requested: request.milli_cpu,
            used: requested.milli_cpu,
            capacity: allocatable.milli_cpu,
        });
    }
    if request.memory > allocatable.memory - requested.memory {
        insufficient.push(InsufficientResource {
            resource_name: BATCH_MEMORY.to_string(),
            reason: REASON_INSUFFICIENT_BATCH_MEMORY.to_string(),
            requested: request.memory,
            used: requested.memory,
            capacity: allocatable.memory,
        });
    }

    insufficient
}
