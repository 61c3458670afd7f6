//! Scheduler metrics and structured event logging
//!
//! Prometheus collectors are registered once per process in the default
//! registry; `SchedulerMetrics` handles share them.

use crate::framework::Status;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct SchedulerMetricsInner {
    filter_latency_seconds: HistogramVec,
    score_latency_seconds: HistogramVec,
    node_rejections: IntCounterVec,
    scoring_errors: IntCounter,
    tracked_assignments: IntGauge,
    pod_events: IntCounterVec,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            filter_latency_seconds: register_histogram_vec!(
                "loadaware_scheduler_filter_latency_seconds",
                "Time spent in a filter plugin for one node",
                &["plugin"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register filter_latency_seconds"),

            score_latency_seconds: register_histogram_vec!(
                "loadaware_scheduler_score_latency_seconds",
                "Time spent in a score plugin for one node",
                &["plugin"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register score_latency_seconds"),

            node_rejections: register_int_counter_vec!(
                "loadaware_scheduler_node_rejections_total",
                "Nodes rejected by a filter plugin",
                &["plugin"]
            )
            .expect("Failed to register node_rejections_total"),

            scoring_errors: register_int_counter!(
                "loadaware_scheduler_scoring_errors_total",
                "Score plugin calls that returned an error"
            )
            .expect("Failed to register scoring_errors_total"),

            tracked_assignments: register_int_gauge!(
                "loadaware_scheduler_tracked_assignments",
                "Pods held in the assignment cache"
            )
            .expect("Failed to register tracked_assignments"),

            pod_events: register_int_counter_vec!(
                "loadaware_scheduler_pod_events_total",
                "Pod lifecycle events applied to the assignment cache",
                &["kind"]
            )
            .expect("Failed to register pod_events_total"),
        }
    }
}

/// Handle to the process-wide scheduler metrics
#[derive(Clone)]
pub struct SchedulerMetrics {
    inner: &'static SchedulerMetricsInner,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new),
        }
    }

    pub fn observe_filter_latency(&self, plugin: &str, duration_secs: f64) {
        self.inner
            .filter_latency_seconds
            .with_label_values(&[plugin])
            .observe(duration_secs);
    }

    pub fn observe_score_latency(&self, plugin: &str, duration_secs: f64) {
        self.inner
            .score_latency_seconds
            .with_label_values(&[plugin])
            .observe(duration_secs);
    }

    pub fn inc_node_rejections(&self, plugin: &str) {
        self.inner.node_rejections.with_label_values(&[plugin]).inc();
    }

    pub fn inc_scoring_errors(&self) {
        self.inner.scoring_errors.inc();
    }

    pub fn set_tracked_assignments(&self, count: usize) {
        self.inner
            .tracked_assignments
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn inc_pod_events(&self, kind: &str) {
        self.inner.pod_events.with_label_values(&[kind]).inc();
    }

    /// Default registry in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Event-tagged log records for scheduling decisions
#[derive(Clone)]
pub struct StructuredLogger {
    scheduler_name: String,
}

impl StructuredLogger {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, nodes: usize, node_metrics: usize) {
        info!(
            event = "scheduler_started",
            scheduler = %self.scheduler_name,
            version = %version,
            nodes = nodes,
            node_metrics = node_metrics,
            "Load-aware scheduler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            scheduler = %self.scheduler_name,
            reason = %reason,
            "Load-aware scheduler shutting down"
        );
    }

    pub fn log_config_loaded(&self, source: &str, expiration_seconds: Option<i64>) {
        info!(
            event = "config_loaded",
            scheduler = %self.scheduler_name,
            source = %source,
            node_metric_expiration_seconds = ?expiration_seconds,
            "Scheduler configuration loaded"
        );
    }

    pub fn log_node_rejected(&self, pod: &str, node: &str, plugin: &str, reasons: &[String]) {
        info!(
            event = "node_rejected",
            scheduler = %self.scheduler_name,
            pod = %pod,
            node = %node,
            plugin = %plugin,
            reasons = %reasons.join("; "),
            "Node filtered out"
        );
    }

    pub fn log_node_scored(&self, pod: &str, node: &str, score: i64) {
        info!(
            event = "node_scored",
            scheduler = %self.scheduler_name,
            pod = %pod,
            node = %node,
            score = score,
            "Node scored"
        );
    }

    pub fn log_scoring_error(&self, pod: &str, node: &str, error: &str) {
        warn!(
            event = "scoring_error",
            scheduler = %self.scheduler_name,
            pod = %pod,
            node = %node,
            error = %error,
            "Score plugin failed"
        );
    }

    pub fn log_reserve(&self, pod: &str, node: &str, status: &Status) {
        if status.is_success() {
            info!(
                event = "pod_reserved",
                scheduler = %self.scheduler_name,
                pod = %pod,
                node = %node,
                "Pod reserved on node"
            );
        } else {
            warn!(
                event = "pod_reserve_rejected",
                scheduler = %self.scheduler_name,
                pod = %pod,
                node = %node,
                status = %status,
                "Reserve plugin rejected pod"
            );
        }
    }

    pub fn log_unreserve(&self, pod: &str, node: &str) {
        info!(
            event = "pod_unreserved",
            scheduler = %self.scheduler_name,
            pod = %pod,
            node = %node,
            "Pod reservation released"
        );
    }
}
