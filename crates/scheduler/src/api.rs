//! HTTP API for scheduling, health checks and Prometheus metrics

use crate::cycle::{ScheduleResult, SchedulingCycle};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use scheduler_lib::{
    extension::ResourceTranslator, BatchResourceFit, ClusterStore, ComponentStatus, ConfigError,
    FilterPlugin, HealthRegistry, ListerError, LoadAwareArgs, LoadAwareScheduling, Pod,
    PodAssignCache, PodEvent, ReservePlugin, SchedulerMetrics, Status, StructuredLogger,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SchedulerMetrics,
    pub logger: StructuredLogger,
    pub store: Arc<ClusterStore>,
    pub assign_cache: Arc<PodAssignCache>,
    pub cycle: SchedulingCycle,
    pub reserver: Arc<dyn ReservePlugin>,
    pub events_tx: mpsc::Sender<PodEvent>,
}

impl AppState {
    /// Wire the plugins over shared cluster state. Fails on invalid arguments.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        args: LoadAwareArgs,
        translator: ResourceTranslator,
        store: Arc<ClusterStore>,
        assign_cache: Arc<PodAssignCache>,
        health_registry: HealthRegistry,
        metrics: SchedulerMetrics,
        logger: StructuredLogger,
        events_tx: mpsc::Sender<PodEvent>,
    ) -> Result<Self, ConfigError> {
        let load_aware = Arc::new(LoadAwareScheduling::new(
            args,
            store.clone(),
            store.clone(),
            assign_cache.clone(),
            translator,
        )?);
        let filters: Vec<Arc<dyn FilterPlugin>> = vec![
            Arc::new(BatchResourceFit::new(store.clone())),
            load_aware.clone(),
        ];
        let cycle = SchedulingCycle::new(
            filters,
            load_aware.clone(),
            store.clone(),
            metrics.clone(),
            logger.clone(),
        );

        Ok(Self {
            health_registry,
            metrics,
            logger,
            store,
            assign_cache,
            cycle,
            reserver: load_aware,
            events_tx,
        })
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Lister(#[from] ListerError),

    #[error("pod event channel closed")]
    EventsClosed,

    #[error("failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Lister(ListerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Lister(ListerError::Unavailable(_)) | ApiError::EventsClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub pod: Pod,
    pub node: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveResponse {
    pub pod: String,
    pub node: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentView {
    pub uid: String,
    pub pod: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentsResponse {
    pub node: String,
    pub assignments: Vec<AssignmentView>,
}

/// 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let buffer = state.metrics.encode()?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn schedule(State(state): State<Arc<AppState>>, Json(pod): Json<Pod>) -> Json<ScheduleResult> {
    Json(state.cycle.run(pod).await)
}

async fn reserve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    let ReserveRequest { pod, node } = request;

    state.store.place_pod(&pod, &node)?;
    let status = state.reserver.reserve(&pod, &node);
    if !status.is_success() {
        state.store.release_pod(&pod);
    }

    state.metrics.set_tracked_assignments(state.assign_cache.len());
    state.logger.log_reserve(&pod.key(), &node, &status);

    Ok(Json(ReserveResponse {
        pod: pod.key(),
        node,
        status,
    }))
}

async fn unreserve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReserveRequest>,
) -> Json<ReserveResponse> {
    let ReserveRequest { pod, node } = request;

    state.reserver.unreserve(&pod, &node);
    state.store.release_pod(&pod);

    state.metrics.set_tracked_assignments(state.assign_cache.len());
    state.logger.log_unreserve(&pod.key(), &node);

    Json(ReserveResponse {
        pod: pod.key(),
        node,
        status: Status::success(),
    })
}

/// Keep node requested totals in step with a pod event
fn sync_store(store: &ClusterStore, event: &PodEvent) {
    let placed = match event {
        PodEvent::Added { pod } | PodEvent::Updated { new: pod, .. } => pod,
        PodEvent::Deleted { pod } => {
            store.release_pod(pod);
            return;
        }
    };

    if !placed.is_assigned() || placed.is_terminated() {
        store.release_pod(placed);
    } else if let Err(err) = store.place_pod(placed, &placed.node_name) {
        warn!(pod = %placed.key(), error = %err, "Pod event references unknown node");
    }
}

async fn events(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PodEvent>,
) -> Result<StatusCode, ApiError> {
    sync_store(&state.store, &event);
    state
        .events_tx
        .send(event)
        .await
        .map_err(|_| ApiError::EventsClosed)?;
    Ok(StatusCode::ACCEPTED)
}

async fn assignments(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> Json<AssignmentsResponse> {
    let assignments = state
        .assign_cache
        .records(&node)
        .into_iter()
        .map(|record| AssignmentView {
            uid: record.pod.uid.clone(),
            pod: record.pod.key(),
            timestamp: record.timestamp,
        })
        .collect();

    Json(AssignmentsResponse { node, assignments })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/schedule", post(schedule))
        .route("/api/v1/reserve", post(reserve))
        .route("/api/v1/unreserve", post(unreserve))
        .route("/api/v1/events", post(events))
        .route("/api/v1/assignments/:node", get(assignments))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
