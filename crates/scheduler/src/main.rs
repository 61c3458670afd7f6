//! Load-aware scheduler
//!
//! Serves filter, score and reserve decisions over HTTP for a cluster
//! snapshot, keeping pending assignments in step with pod events.

use anyhow::{Context, Result};
use loadaware_scheduler::{
    api::{self, AppState},
    config::{SchedulerConfig, CONFIG_FILE_ENV},
    inventory::Inventory,
};
use scheduler_lib::{
    extension::default_translator,
    health::{components, ComponentHealth, HealthRegistry},
    ClusterStore, PodAssignCache, PodEventHandler, SchedulerMetrics, StructuredLogger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting loadaware-scheduler");

    let config_file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    let config = SchedulerConfig::load_from(config_file.as_deref())?;

    let logger = StructuredLogger::new(&config.scheduler_name);
    logger.log_config_loaded(
        &SchedulerConfig::source_description(config_file.as_deref()),
        config.load_aware.node_metric_expiration_seconds,
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ASSIGN_CACHE).await;
    health_registry.register(components::CLUSTER_STORE).await;
    health_registry.register(components::EVENT_HANDLER).await;

    let metrics = SchedulerMetrics::new();
    let store = Arc::new(ClusterStore::new());
    let assign_cache = Arc::new(PodAssignCache::new());

    if let Some(path) = &config.inventory_path {
        let loaded = Inventory::from_file(path).map(|inventory| {
            inventory.load_into(&store, &assign_cache)
        });
        health_registry
            .report(components::CLUSTER_STORE, ComponentHealth::from_result(&loaded))
            .await;
        match loaded {
            Ok(summary) => info!(
                nodes = summary.nodes,
                node_metrics = summary.node_metrics,
                bound_pods = summary.bound_pods,
                skipped_pods = summary.skipped_pods,
                "Inventory loaded"
            ),
            Err(err) => warn!(error = %format!("{:#}", err), "Starting with an empty cluster"),
        }
    }
    metrics.set_tracked_assignments(assign_cache.len());

    let (handler, events_tx) = PodEventHandler::new(assign_cache.clone(), config.event_buffer);
    let handler = handler.with_metrics(metrics.clone());

    let state = AppState::assemble(
        config.load_aware.clone(),
        default_translator(),
        store.clone(),
        assign_cache,
        health_registry.clone(),
        metrics,
        logger.clone(),
        events_tx,
    )
    .context("Failed to build scheduling plugins")?;
    let state = Arc::new(state);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let events_health = health_registry.clone();
    let events_shutdown = shutdown_tx.subscribe();
    let handler_task = tokio::spawn(async move {
        let applied = handler.run(events_shutdown).await;
        events_health
            .set_unhealthy(components::EVENT_HANDLER, "pod event handler stopped")
            .await;
        applied
    });

    health_registry.set_ready(true).await;
    logger.log_startup(SCHEDULER_VERSION, store.node_count(), store.metric_count());

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(api::serve(config.api_port, state, async move {
        let _ = api_shutdown.recv().await;
    }));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    let applied = handler_task.await.context("Pod event handler panicked")?;
    info!(events_applied = applied, "Pod event handler stopped");
    api_task.await.context("API server panicked")??;

    info!("Shutdown complete");
    Ok(())
}
