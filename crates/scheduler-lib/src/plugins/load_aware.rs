//! Load-aware scheduling plugin
//!
//! Filters out nodes whose reported usage crosses the configured thresholds
//! and scores the rest by how much headroom they keep once the candidate
//! pod, the pods assigned since the last telemetry report, and the reported
//! usage are added up.

use crate::config::{ConfigError, LoadAwareArgs};
use crate::estimator::{estimate_pod_usage, resource_amount, Estimate};
use crate::expiration::is_node_metric_expired;
use crate::extension::{custom_usage_thresholds, ResourceTranslator};
use crate::framework::{
    FilterPlugin, ListerError, NodeInfoLister, NodeMetricLister, Plugin, PluginError,
    ReservePlugin, ScorePlugin, Status,
};
use crate::models::{Node, NodeInfo, Pod};
use crate::quantity::{Quantity, ResourceName};
use crate::scorer::{load_aware_score, MIN_NODE_SCORE};
use crate::tracker::PodAssignCache;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const REASON_NODE_METRIC_EXPIRED: &str = "node(s) nodeMetric expired";

pub fn usage_threshold_reason(resource: &str) -> String {
    format!("node(s) {} usage exceed threshold", resource)
}

pub struct LoadAwareScheduling {
    args: LoadAwareArgs,
    node_infos: Arc<dyn NodeInfoLister>,
    node_metrics: Arc<dyn NodeMetricLister>,
    assign_cache: Arc<PodAssignCache>,
    translator: ResourceTranslator,
}

impl LoadAwareScheduling {
    pub const NAME: &'static str = "LoadAwareScheduling";

    /// Build the plugin. Invalid arguments are rejected here and never reach
    /// a scheduling cycle.
    pub fn new(
        args: LoadAwareArgs,
        node_infos: Arc<dyn NodeInfoLister>,
        node_metrics: Arc<dyn NodeMetricLister>,
        assign_cache: Arc<PodAssignCache>,
        translator: ResourceTranslator,
    ) -> Result<Self, ConfigError> {
        args.validate()?;
        Ok(Self {
            args,
            node_infos,
            node_metrics,
            assign_cache,
            translator,
        })
    }

    pub fn args(&self) -> &LoadAwareArgs {
        &self.args
    }

    pub fn assign_cache(&self) -> &Arc<PodAssignCache> {
        &self.assign_cache
    }

    fn lookup_node(&self, node_name: &str) -> Result<NodeInfo, PluginError> {
        self.node_infos.node_info(node_name).map_err(|source| {
            if source.is_not_found() {
                PluginError::NodeNotFound(node_name.to_string())
            } else {
                PluginError::NodeInfo {
                    node: node_name.to_string(),
                    source,
                }
            }
        })
    }

    /// Thresholds in force for `node`: the node's annotation override when it
    /// is valid and non-empty, the configured ones otherwise
    fn usage_thresholds<'a>(&'a self, node: &Node) -> Cow<'a, BTreeMap<ResourceName, i64>> {
        match custom_usage_thresholds(node) {
            Ok(Some(custom)) if !custom.usage_thresholds.is_empty() => {
                Cow::Owned(custom.usage_thresholds)
            }
            Ok(_) => Cow::Borrowed(&self.args.usage_thresholds),
            Err(err) => {
                debug!(node = %node.name, error = %err, "Ignoring invalid usage threshold annotation");
                Cow::Borrowed(&self.args.usage_thresholds)
            }
        }
    }

    fn weighted_amounts(
        &self,
        source: impl Fn(&str) -> Option<Quantity>,
    ) -> Estimate {
        self.args
            .resource_weights
            .keys()
            .map(|resource| {
                let amount = source(resource.as_str())
                    .map(|q| resource_amount(resource, q))
                    .unwrap_or(0);
                (resource.clone(), amount)
            })
            .collect()
    }
}

impl Plugin for LoadAwareScheduling {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl FilterPlugin for LoadAwareScheduling {
    fn filter(&self, _pod: &Pod, node_name: &str) -> Status {
        let node_info = match self.lookup_node(node_name) {
            Ok(info) => info,
            Err(err) => return Status::error(err),
        };

        let metric = match self.node_metrics.node_metric(node_name) {
            Ok(metric) => metric,
            Err(ListerError::NotFound { .. }) => return Status::success(),
            Err(source) => {
                return Status::error(PluginError::NodeMetric {
                    node: node_name.to_string(),
                    source,
                })
            }
        };

        if let Some(expiration_seconds) = self.args.expiration_filter() {
            if is_node_metric_expired(Some(&metric), expiration_seconds) {
                return Status::unschedulable(REASON_NODE_METRIC_EXPIRED);
            }
        }

        let thresholds = self.usage_thresholds(&node_info.node);
        if thresholds.is_empty() {
            return Status::success();
        }
        let Some(usage) = metric.node_usage.as_ref() else {
            return Status::success();
        };

        for (resource, &threshold) in thresholds.iter() {
            if threshold == 0 {
                continue;
            }
            let total = node_info
                .node
                .allocatable
                .get(resource)
                .map(|q| q.milli_value())
                .unwrap_or(0);
            if total == 0 {
                continue;
            }
            let used = usage
                .resources
                .get(resource)
                .map(|q| q.milli_value())
                .unwrap_or(0);
            let percent = (used as f64 / total as f64 * 100.0).round() as i64;
            if percent >= threshold {
                return Status::unschedulable(usage_threshold_reason(resource));
            }
        }

        Status::success()
    }
}

impl ScorePlugin for LoadAwareScheduling {
    fn score(&self, pod: &Pod, node_name: &str) -> Result<i64, PluginError> {
        let node_info = self.lookup_node(node_name)?;

        let metric = match self.node_metrics.node_metric(node_name) {
            Ok(metric) => metric,
            Err(ListerError::NotFound { .. }) => return Ok(MIN_NODE_SCORE),
            Err(source) => {
                return Err(PluginError::NodeMetric {
                    node: node_name.to_string(),
                    source,
                })
            }
        };

        let expiration_seconds = self.args.node_metric_expiration_seconds.unwrap_or(0);
        if is_node_metric_expired(Some(&metric), expiration_seconds) {
            return Ok(MIN_NODE_SCORE);
        }

        let weights = &self.args.resource_weights;
        let factors = &self.args.estimated_scaling_factors;

        let mut used = estimate_pod_usage(pod, weights, factors, &self.translator);
        let pending = self.assign_cache.estimated_assigned_usage(
            node_name,
            &metric,
            weights,
            factors,
            &self.translator,
        );
        let reported = self.weighted_amounts(|resource| {
            metric
                .node_usage
                .as_ref()
                .and_then(|u| u.resources.get(resource).copied())
        });
        for (resource, amount) in pending.into_iter().chain(reported) {
            *used.entry(resource).or_insert(0) += amount;
        }

        let allocatable =
            self.weighted_amounts(|resource| node_info.node.allocatable.get(resource).copied());

        Ok(load_aware_score(weights, &used, &allocatable))
    }
}

impl ReservePlugin for LoadAwareScheduling {
    fn reserve(&self, pod: &Pod, node_name: &str) -> Status {
        self.assign_cache.assign(node_name, Arc::new(pod.clone()));
        Status::success()
    }

    fn unreserve(&self, pod: &Pod, node_name: &str) {
        self.assign_cache.unassign(node_name, pod);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{default_translator, ANNOTATION_CUSTOM_USAGE_THRESHOLDS};
    use crate::framework::{ClusterStore, Code};
    use crate::models::{Container, NodeMetric, NodeUsage, ResourceRequirements};
    use crate::quantity::ResourceList;
    use chrono::{Duration, Utc};

    struct FailingMetrics;

    impl NodeMetricLister for FailingMetrics {
        fn node_metric(&self, _node_name: &str) -> Result<NodeMetric, ListerError> {
            Err(ListerError::Unavailable("connection refused".to_string()))
        }
    }

    fn list(entries: &[(&str, &str)]) -> ResourceList {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.parse().unwrap()))
            .collect()
    }

    fn node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            allocatable: list(&[("cpu", "32"), ("memory", "64Gi")]),
            ..Default::default()
        }
    }

    fn metric(name: &str, age_secs: i64, usage: &[(&str, &str)]) -> NodeMetric {
        NodeMetric {
            node_name: name.to_string(),
            update_time: Some(Utc::now() - Duration::seconds(age_secs)),
            node_usage: Some(NodeUsage {
                resources: list(usage),
            }),
            ..Default::default()
        }
    }

    fn pod(uid: &str, cpu: &str, memory: &str) -> Pod {
        let requests = list(&[("cpu", cpu), ("memory", memory)]);
        Pod {
            uid: uid.to_string(),
            name: uid.to_string(),
            containers: vec![Container {
                name: "main".to_string(),
                resources: ResourceRequirements {
                    requests: requests.clone(),
                    limits: requests,
                },
            }],
            ..Default::default()
        }
    }

    fn plugin_with(args: LoadAwareArgs, store: Arc<ClusterStore>) -> LoadAwareScheduling {
        LoadAwareScheduling::new(
            args,
            store.clone(),
            store,
            Arc::new(PodAssignCache::new()),
            default_translator(),
        )
        .unwrap()
    }

    fn plugin(store: Arc<ClusterStore>) -> LoadAwareScheduling {
        plugin_with(LoadAwareArgs::default(), store)
    }

    #[test]
    fn test_new_rejects_invalid_args() {
        let store = Arc::new(ClusterStore::new());
        let args = LoadAwareArgs {
            node_metric_expiration_seconds: Some(-1),
            ..Default::default()
        };
        let result = LoadAwareScheduling::new(
            args,
            store.clone(),
            store,
            Arc::new(PodAssignCache::new()),
            default_translator(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidExpiration(-1))));
    }

    #[test]
    fn test_filter_missing_node_is_error() {
        let store = Arc::new(ClusterStore::new());
        let status = plugin(store).filter(&pod("p", "1", "1Gi"), "ghost");
        assert_eq!(status.code, Code::Error);
        assert_eq!(status.reasons, vec!["node not found"]);
    }

    #[test]
    fn test_filter_admits_without_metric() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        assert!(plugin(store).filter(&pod("p", "1", "1Gi"), "n1").is_success());
    }

    #[test]
    fn test_filter_lookup_error_is_error() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        let plugin = LoadAwareScheduling::new(
            LoadAwareArgs::default(),
            store,
            Arc::new(FailingMetrics),
            Arc::new(PodAssignCache::new()),
            default_translator(),
        )
        .unwrap();

        let status = plugin.filter(&pod("p", "1", "1Gi"), "n1");
        assert_eq!(status.code, Code::Error);
        assert!(plugin.score(&pod("p", "1", "1Gi"), "n1").is_err());
    }

    #[test]
    fn test_filter_rejects_expired_metric() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        store.upsert_node_metric(metric("n1", 600, &[("cpu", "1")]));

        let status = plugin(store.clone()).filter(&pod("p", "1", "1Gi"), "n1");
        assert_eq!(status, Status::unschedulable(REASON_NODE_METRIC_EXPIRED));

        let args = LoadAwareArgs {
            filter_expired_node_metrics: Some(false),
            ..Default::default()
        };
        assert!(plugin_with(args, store)
            .filter(&pod("p", "1", "1Gi"), "n1")
            .is_success());
    }

    #[test]
    fn test_filter_usage_threshold() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        store.upsert_node(node("n2"));
        // 21/32 = 65.6% rounds to 66, over the 65% default
        store.upsert_node_metric(metric("n1", 10, &[("cpu", "21"), ("memory", "10Gi")]));
        // 20/32 = 62.5% rounds to 63
        store.upsert_node_metric(metric("n2", 10, &[("cpu", "20"), ("memory", "10Gi")]));

        let plugin = plugin(store);
        assert_eq!(
            plugin.filter(&pod("p", "1", "1Gi"), "n1"),
            Status::unschedulable("node(s) cpu usage exceed threshold")
        );
        assert!(plugin.filter(&pod("p", "1", "1Gi"), "n2").is_success());
    }

    #[test]
    fn test_filter_annotation_overrides_thresholds() {
        let store = Arc::new(ClusterStore::new());
        let mut strict = node("n1");
        strict.annotations.insert(
            ANNOTATION_CUSTOM_USAGE_THRESHOLDS.to_string(),
            r#"{"usageThresholds": {"memory": 10}}"#.to_string(),
        );
        store.upsert_node(strict);
        store.upsert_node_metric(metric("n1", 10, &[("cpu", "1"), ("memory", "16Gi")]));

        assert_eq!(
            plugin(store).filter(&pod("p", "1", "1Gi"), "n1"),
            Status::unschedulable("node(s) memory usage exceed threshold")
        );
    }

    #[test]
    fn test_filter_ignores_invalid_annotation() {
        let store = Arc::new(ClusterStore::new());
        let mut broken = node("n1");
        broken.annotations.insert(
            ANNOTATION_CUSTOM_USAGE_THRESHOLDS.to_string(),
            "not json".to_string(),
        );
        store.upsert_node(broken);
        store.upsert_node_metric(metric("n1", 10, &[("cpu", "1"), ("memory", "1Gi")]));

        assert!(plugin(store).filter(&pod("p", "1", "1Gi"), "n1").is_success());
    }

    #[test]
    fn test_score_without_metric_is_zero() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        assert_eq!(plugin(store).score(&pod("p", "1", "1Gi"), "n1").unwrap(), 0);
    }

    #[test]
    fn test_score_expired_metric_is_zero() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        store.upsert_node_metric(metric("n1", 600, &[]));
        assert_eq!(plugin(store).score(&pod("p", "1", "1Gi"), "n1").unwrap(), 0);
    }

    #[test]
    fn test_score_prefers_idle_node() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("busy"));
        store.upsert_node(node("idle"));
        store.upsert_node_metric(metric("busy", 10, &[("cpu", "16"), ("memory", "32Gi")]));
        store.upsert_node_metric(metric("idle", 10, &[("cpu", "0"), ("memory", "0")]));

        let plugin = plugin(store);
        let p = pod("p", "4", "8Gi");
        let busy = plugin.score(&p, "busy").unwrap();
        let idle = plugin.score(&p, "idle").unwrap();
        assert!(idle > busy, "idle={} busy={}", idle, busy);
    }

    #[test]
    fn test_score_exact_figures() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        store.upsert_node_metric(metric("n1", 10, &[("cpu", "8"), ("memory", "16Gi")]));

        // cpu: 8000m reported + 4000m * 85% = 11400m of 32000m -> 64
        // memory: 16Gi + 8Gi * 70% = 21.6Gi of 64Gi -> 66
        let score = plugin(store).score(&pod("p", "4", "8Gi"), "n1").unwrap();
        assert_eq!(score, (64 + 66) / 2);
    }

    #[test]
    fn test_reserved_pods_lower_the_score() {
        let store = Arc::new(ClusterStore::new());
        store.upsert_node(node("n1"));
        store.upsert_node_metric(metric("n1", 10, &[("cpu", "0"), ("memory", "0")]));

        let plugin = plugin(store);
        let candidate = pod("p", "4", "8Gi");
        let before = plugin.score(&candidate, "n1").unwrap();

        let reserved = pod("r", "16", "32Gi");
        assert!(plugin.reserve(&reserved, "n1").is_success());
        let during = plugin.score(&candidate, "n1").unwrap();
        assert!(during < before);

        plugin.unreserve(&reserved, "n1");
        plugin.unreserve(&reserved, "n1");
        assert_eq!(plugin.score(&candidate, "n1").unwrap(), before);
    }
}
