//! Load-aware scheduling arguments
//!
//! Arguments are validated once when the plugin is constructed; a plugin
//! never runs with an invalid configuration.

use crate::quantity::ResourceName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Configuration errors, reported at construction time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("node_metric_expiration_seconds must be positive, got {0}")]
    InvalidExpiration(i64),

    #[error("resource weight for {resource} must be within 0..=100, got {value}")]
    InvalidWeight { resource: String, value: i64 },

    #[error("at least one resource weight must be positive")]
    NoPositiveWeight,

    #[error("usage threshold for {resource} must be within 0..=100, got {value}")]
    InvalidThreshold { resource: String, value: i64 },

    #[error("estimated scaling factor for {resource} must be within 0..=100, got {value}")]
    InvalidScalingFactor { resource: String, value: i64 },
}

/// Arguments of the load-aware scheduling plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadAwareArgs {
    /// Reject nodes whose telemetry is older than `node_metric_expiration_seconds`
    pub filter_expired_node_metrics: Option<bool>,
    /// Age after which a telemetry snapshot is considered stale
    pub node_metric_expiration_seconds: Option<i64>,
    /// Weights of the resources taking part in scoring
    pub resource_weights: BTreeMap<ResourceName, i64>,
    /// Usage percentage at or above which the filter rejects a node
    pub usage_thresholds: BTreeMap<ResourceName, i64>,
    /// Percentage of a pod's request expected to be used
    pub estimated_scaling_factors: BTreeMap<ResourceName, i64>,
}

impl Default for LoadAwareArgs {
    fn default() -> Self {
        Self {
            filter_expired_node_metrics: Some(true),
            node_metric_expiration_seconds: Some(180),
            resource_weights: [("cpu".to_string(), 1), ("memory".to_string(), 1)].into(),
            usage_thresholds: [("cpu".to_string(), 65), ("memory".to_string(), 95)].into(),
            estimated_scaling_factors: [("cpu".to_string(), 85), ("memory".to_string(), 70)]
                .into(),
        }
    }
}

fn check_percentages(
    values: &BTreeMap<ResourceName, i64>,
    err: impl Fn(String, i64) -> ConfigError,
) -> Result<(), ConfigError> {
    for (resource, &value) in values {
        if !(0..=100).contains(&value) {
            return Err(err(resource.clone(), value));
        }
    }
    Ok(())
}

impl LoadAwareArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(seconds) = self.node_metric_expiration_seconds {
            if seconds <= 0 {
                return Err(ConfigError::InvalidExpiration(seconds));
            }
        }

        check_percentages(&self.resource_weights, |resource, value| {
            ConfigError::InvalidWeight { resource, value }
        })?;
        if self.resource_weights.values().sum::<i64>() <= 0 {
            return Err(ConfigError::NoPositiveWeight);
        }

        check_percentages(&self.usage_thresholds, |resource, value| {
            ConfigError::InvalidThreshold { resource, value }
        })?;
        check_percentages(&self.estimated_scaling_factors, |resource, value| {
            ConfigError::InvalidScalingFactor { resource, value }
        })?;

        Ok(())
    }

    /// Whether the filter should reject nodes with stale telemetry, and the age limit
    pub fn expiration_filter(&self) -> Option<i64> {
        match (
            self.filter_expired_node_metrics,
            self.node_metric_expiration_seconds,
        ) {
            (Some(true), Some(seconds)) => Some(seconds),
            _ => None,
        }
    }
}
