//! Integration tests for the scheduler API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use loadaware_scheduler::api::{create_router, AppState};
use scheduler_lib::{
    extension::default_translator,
    health::{components, HealthRegistry},
    ClusterStore, LoadAwareArgs, Node, NodeInfoLister, NodeMetric, NodeUsage, Plugin, Pod,
    PodAssignCache, PodEvent, PodEventHandler, Quantity, ReservePlugin, ResourceList,
    SchedulerMetrics, Status, StructuredLogger,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

fn list(entries: &[(&str, &str)]) -> ResourceList {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.parse::<Quantity>().unwrap()))
        .collect()
}

fn node(name: &str) -> Node {
    Node {
        name: name.to_string(),
        allocatable: list(&[("cpu", "16"), ("memory", "32Gi")]),
        ..Default::default()
    }
}

fn metric(name: &str, cpu: &str) -> NodeMetric {
    NodeMetric {
        node_name: name.to_string(),
        update_time: Some(Utc::now() - Duration::seconds(5)),
        node_usage: Some(NodeUsage {
            resources: list(&[("cpu", cpu), ("memory", "4Gi")]),
        }),
        ..Default::default()
    }
}

fn pod_json(uid: &str, cpu: &str) -> Value {
    json!({
        "uid": uid,
        "name": uid,
        "containers": [
            {"name": "app", "resources": {"requests": {"cpu": cpu, "memory": "1Gi"}}}
        ]
    })
}

/// Router plus state, with the event handler's receiving end returned unstarted
async fn setup_test_app() -> (Router, Arc<AppState>, PodEventHandler) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ASSIGN_CACHE).await;
    health_registry.register(components::CLUSTER_STORE).await;

    let store = Arc::new(ClusterStore::new());
    for (name, cpu) in [("n1", "2"), ("n2", "10")] {
        store.upsert_node(node(name));
        store.upsert_node_metric(metric(name, cpu));
    }

    let assign_cache = Arc::new(PodAssignCache::new());
    let (handler, events_tx) = PodEventHandler::new(assign_cache.clone(), 16);

    let state = Arc::new(
        AppState::assemble(
            LoadAwareArgs::default(),
            default_translator(),
            store,
            assign_cache,
            health_registry,
            SchedulerMetrics::new(),
            StructuredLogger::new("test"),
            events_tx,
        )
        .unwrap(),
    );
    let router = create_router(state.clone());

    (router, state, handler)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state, _handler) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["assign_cache"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _handler) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::CLUSTER_STORE, "inventory unreadable")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_initialization() {
    let (app, state, _handler) = setup_test_app().await;

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state, _handler) = setup_test_app().await;

    // One cycle populates the latency histograms
    let (status, _) = post(app.clone(), "/api/v1/schedule", pod_json("warmup", "1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("loadaware_scheduler_filter_latency_seconds_bucket"));
    assert!(text.contains("loadaware_scheduler_score_latency_seconds_count"));
}

#[tokio::test]
async fn test_schedule_picks_least_loaded_node() {
    let (app, _state, _handler) = setup_test_app().await;

    let (status, result) = post(app, "/api/v1/schedule", pod_json("web", "1")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(result["pod"], "default/web");
    assert_eq!(result["selected_node"], "n1");
    assert_eq!(result["nodes"][0]["node"], "n1");
    assert_eq!(result["nodes"][1]["node"], "n2");
    assert!(result["nodes"][0]["score"].as_i64() > result["nodes"][1]["score"].as_i64());
}

#[tokio::test]
async fn test_reserve_tracks_and_unreserve_releases() {
    let (app, state, _handler) = setup_test_app().await;
    let request = json!({"pod": pod_json("p1", "4"), "node": "n1"});

    let (status, body) = post(app.clone(), "/api/v1/reserve", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["code"], "success");

    let (status, body) = get(app.clone(), "/api/v1/assignments/n1").await;
    assert_eq!(status, StatusCode::OK);
    let assignments: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(assignments["assignments"][0]["uid"], "p1");

    let info = state.store.node_info("n1").unwrap();
    assert_eq!(info.requested["cpu"].milli_value(), 4000);

    let (status, _) = post(app.clone(), "/api/v1/unreserve", request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.assign_cache.is_empty());

    let info = state.store.node_info("n1").unwrap();
    assert!(info.requested.get("cpu").is_none());
}

struct RejectingReserve;

impl Plugin for RejectingReserve {
    fn name(&self) -> &'static str {
        "RejectingReserve"
    }
}

impl ReservePlugin for RejectingReserve {
    fn reserve(&self, _pod: &Pod, _node_name: &str) -> Status {
        Status::unschedulable("node is draining")
    }

    fn unreserve(&self, _pod: &Pod, _node_name: &str) {}
}

#[tokio::test]
async fn test_rejected_reserve_releases_node_requests() {
    let (_, state, _handler) = setup_test_app().await;
    let mut rejecting = (*state).clone();
    rejecting.reserver = Arc::new(RejectingReserve);
    let state = Arc::new(rejecting);
    let app = create_router(state.clone());

    let request = json!({"pod": pod_json("p1", "4"), "node": "n1"});
    let (status, body) = post(app, "/api/v1/reserve", request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["code"], "unschedulable");
    assert_eq!(body["status"]["reasons"][0], "node is draining");
    assert!(state.assign_cache.is_empty());
    let info = state.store.node_info("n1").unwrap();
    assert!(info.requested.get("cpu").is_none());
}

#[tokio::test]
async fn test_reserve_unknown_node_returns_404() {
    let (app, state, _handler) = setup_test_app().await;

    let request = json!({"pod": pod_json("p1", "1"), "node": "ghost"});
    let (status, body) = post(app, "/api/v1/reserve", request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "node ghost not found");
    assert!(state.assign_cache.is_empty());
}

#[tokio::test]
async fn test_events_feed_the_assignment_cache() {
    let (app, state, handler) = setup_test_app().await;
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(handler.run(shutdown_rx));

    let mut pod = pod_json("p9", "2");
    pod["node_name"] = json!("n2");
    pod["phase"] = json!("Running");

    let (status, _) = post(
        app.clone(),
        "/api/v1/events",
        json!({"type": "added", "pod": pod}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut tracked = false;
    for _ in 0..50 {
        if state.assign_cache.node_of("p9").is_some() {
            tracked = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(tracked);

    let info = state.store.node_info("n2").unwrap();
    assert_eq!(info.requested["cpu"].milli_value(), 2000);
}

#[tokio::test]
async fn test_events_return_503_when_handler_gone() {
    let (app, _state, handler) = setup_test_app().await;
    drop(handler);

    let event = serde_json::to_value(PodEvent::Deleted {
        pod: serde_json::from_value(pod_json("p1", "1")).unwrap(),
    })
    .unwrap();
    let (status, body) = post(app, "/api/v1/events", event).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "pod event channel closed");
}
