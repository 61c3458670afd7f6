//! Scheduler configuration

use anyhow::{Context, Result};
use scheduler_lib::LoadAwareArgs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "SCHEDULER_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Name reported in logs
    #[serde(default = "default_scheduler_name")]
    pub scheduler_name: String,

    /// Port for the scheduling, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Cluster inventory loaded at startup
    #[serde(default)]
    pub inventory_path: Option<PathBuf>,

    /// Capacity of the pod event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default)]
    pub load_aware: LoadAwareArgs,
}

fn default_scheduler_name() -> String {
    "loadaware-scheduler".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: default_scheduler_name(),
            api_port: default_api_port(),
            inventory_path: None,
            event_buffer: default_event_buffer(),
            load_aware: LoadAwareArgs::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load from an optional file layered under `SCHEDULER_*` environment
    /// variables, then validate the plugin arguments
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("SCHEDULER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read scheduler configuration")?;

        let config: SchedulerConfig = config
            .try_deserialize()
            .context("Invalid scheduler configuration")?;
        config
            .load_aware
            .validate()
            .context("Invalid load-aware scheduling arguments")?;

        Ok(config)
    }

    /// Where the configuration came from, for the startup log
    pub fn source_description(file: Option<&Path>) -> String {
        match file {
            Some(path) => format!("file {} + environment", path.display()),
            None => "environment".to_string(),
        }
    }
}
