//! Extended resource names, priority classes and node annotations
//!
//! Batch-tier and mid-tier workloads are billed against extended resources
//! instead of `cpu`/`memory`. Two naming generations of the batch resources
//! coexist in clusters that were upgraded in place.

use crate::models::{Node, Pod};
use crate::quantity::ResourceName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";

pub const BATCH_CPU: &str = "kubernetes.io/batch-cpu";
pub const BATCH_MEMORY: &str = "kubernetes.io/batch-memory";
pub const MID_CPU: &str = "kubernetes.io/mid-cpu";
pub const MID_MEMORY: &str = "kubernetes.io/mid-memory";

/// Legacy batch CPU name, still reported by nodes running older agents
pub const LEGACY_BATCH_CPU: &str = "koordinator.sh/batch-cpu";
/// Legacy batch memory name, still reported by nodes running older agents
pub const LEGACY_BATCH_MEMORY: &str = "koordinator.sh/batch-memory";

pub const LABEL_PRIORITY_CLASS: &str = "koordinator.sh/priority-class";
pub const ANNOTATION_CUSTOM_USAGE_THRESHOLDS: &str = "scheduling.koordinator.sh/usage-thresholds";

/// Quality tier a pod runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityClass {
    Prod,
    Mid,
    Batch,
    Free,
    None,
}

impl PriorityClass {
    fn from_label(value: &str) -> Option<Self> {
        match value {
            "koord-prod" => Some(PriorityClass::Prod),
            "koord-mid" => Some(PriorityClass::Mid),
            "koord-batch" => Some(PriorityClass::Batch),
            "koord-free" => Some(PriorityClass::Free),
            _ => None,
        }
    }

    fn from_priority(priority: i32) -> Self {
        match priority {
            9000..=9999 => PriorityClass::Prod,
            7000..=7999 => PriorityClass::Mid,
            5000..=5999 => PriorityClass::Batch,
            3000..=3999 => PriorityClass::Free,
            _ => PriorityClass::None,
        }
    }
}

/// Resolve a pod's priority class: explicit label first, then the numeric priority band
pub fn priority_class_of(pod: &Pod) -> PriorityClass {
    if let Some(class) = pod
        .labels
        .get(LABEL_PRIORITY_CLASS)
        .and_then(|v| PriorityClass::from_label(v))
    {
        return class;
    }
    pod.priority
        .map(PriorityClass::from_priority)
        .unwrap_or(PriorityClass::None)
}

/// Maps a weighted resource kind to the resource a pod of the given class is billed against
pub type ResourceTranslator = Arc<dyn Fn(&str, PriorityClass) -> ResourceName + Send + Sync>;

/// Standard translation: batch and mid pods use their tier's extended resources
pub fn translate_resource_name(resource: &str, class: PriorityClass) -> ResourceName {
    let translated = match (class, resource) {
        (PriorityClass::Batch, RESOURCE_CPU) => BATCH_CPU,
        (PriorityClass::Batch, RESOURCE_MEMORY) => BATCH_MEMORY,
        (PriorityClass::Mid, RESOURCE_CPU) => MID_CPU,
        (PriorityClass::Mid, RESOURCE_MEMORY) => MID_MEMORY,
        _ => resource,
    };
    translated.to_string()
}

pub fn default_translator() -> ResourceTranslator {
    Arc::new(translate_resource_name)
}

/// Resources whose estimates default to a CPU request when undeclared
pub fn is_cpu_class(resource: &str) -> bool {
    matches!(resource, RESOURCE_CPU | BATCH_CPU)
}

/// Resources whose estimates default to a memory request when undeclared
pub fn is_memory_class(resource: &str) -> bool {
    matches!(resource, RESOURCE_MEMORY | BATCH_MEMORY)
}

/// Per-node override of the load-aware usage thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomUsageThresholds {
    #[serde(default)]
    pub usage_thresholds: BTreeMap<ResourceName, i64>,
}

/// Parse the usage-threshold override annotation; `Ok(None)` when the node has none
pub fn custom_usage_thresholds(node: &Node) -> Result<Option<CustomUsageThresholds>, serde_json::Error> {
    match node.annotations.get(ANNOTATION_CUSTOM_USAGE_THRESHOLDS) {
        Some(raw) => serde_json::from_str(raw).map(Some),
        None => Ok(None),
    }
}
