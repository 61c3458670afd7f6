//! Node telemetry staleness helpers

use crate::models::NodeMetric;
use chrono::{DateTime, Duration, Utc};

/// Default interval at which node agents report usage, in seconds
pub const DEFAULT_NODE_METRIC_REPORT_INTERVAL_SECS: i64 = 60;

/// Whether a snapshot is too old to trust.
///
/// A missing snapshot or one without an update time is always expired.
/// `expiration_seconds <= 0` disables the age check.
pub fn is_node_metric_expired(metric: Option<&NodeMetric>, expiration_seconds: i64) -> bool {
    is_node_metric_expired_at(metric, expiration_seconds, Utc::now())
}

pub fn is_node_metric_expired_at(
    metric: Option<&NodeMetric>,
    expiration_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    let Some(update_time) = metric.and_then(|m| m.update_time) else {
        return true;
    };
    expiration_seconds > 0 && (now - update_time).num_seconds() >= expiration_seconds
}

/// Interval the node agent declared for its reports, or the default
pub fn report_interval(metric: &NodeMetric) -> Duration {
    metric
        .collect_policy
        .as_ref()
        .and_then(|p| p.report_interval_seconds)
        .map(Duration::seconds)
        .unwrap_or_else(|| Duration::seconds(DEFAULT_NODE_METRIC_REPORT_INTERVAL_SECS))
}
