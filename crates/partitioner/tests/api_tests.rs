//! Integration tests for the partitioner API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use mig_partitioner::api::{create_router, AppState};
use partitioner_lib::{
    health::{components, HealthRegistry},
    oracle::FilterResult,
    snapshot::CandidatePod,
    AdmissionOracle, ComponentStatus, NodeView, OracleError, Planner, ResourceFitOracle,
    SliceCatalog, Status,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Oracle whose transport is down
struct UnreachableOracle;

#[async_trait]
impl AdmissionOracle for UnreachableOracle {
    async fn pre_filter(&self, _pod: &CandidatePod) -> Result<Status, OracleError> {
        Err(OracleError::Transport("connection refused".to_string()))
    }

    async fn filter(
        &self,
        _pod: &CandidatePod,
        _node: &NodeView,
    ) -> Result<FilterResult, OracleError> {
        Err(OracleError::Transport("connection refused".to_string()))
    }
}

async fn setup_test_app_with(planner: Planner) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::PLANNER).await;

    let state = Arc::new(AppState::new(
        health_registry,
        planner,
        Duration::from_secs(30),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let planner = Planner::new(
        Arc::new(ResourceFitOracle::new()),
        Arc::new(SliceCatalog::builtin()),
    );
    setup_test_app_with(planner).await
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn a30_node() -> Value {
    json!({
        "metadata": {
            "name": "node-1",
            "labels": {
                "nvidia.com/gpu.product": "NVIDIA-A30",
                "nvidia.com/gpu.count": "1"
            }
        },
        "status": {
            "allocatable": {"cpu": "8", "memory": "32Gi", "nvidia.com/gpu": "1"}
        }
    })
}

fn pending_pod(name: &str, profile: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "ml"},
        "spec": {
            "containers": [{
                "name": "main",
                "resources": {
                    "requests": {"cpu": "1", (format!("nvidia.com/mig-{profile}")): "1"},
                    "limits": {(format!("nvidia.com/mig-{profile}")): "1"}
                }
            }]
        },
        "status": {"phase": "Pending"}
    })
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["planner"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::PLANNER, "admission oracle unreachable")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::CATALOG, "geometries file unreadable")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = body_json(response).await;
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/readyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let response = app.oneshot(get("/readyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_plan_partitions_unpartitioned_gpu() {
    let (app, _state) = setup_test_app().await;

    let request = json!({
        "nodes": [a30_node()],
        "candidatePods": [pending_pod("trainer", "1g.6gb")]
    });
    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let gpus = body["plan"]["node-1"]["gpus"].as_array().unwrap();
    assert_eq!(gpus.len(), 1);
    assert_eq!(gpus[0]["gpuIndex"], 0);
    assert!(gpus[0]["resources"]["1g.6gb"].as_u64().unwrap() >= 1);

    let changes = body["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["nodeName"], "node-1");
    assert!(body["generatedAt"].is_string());
}

#[tokio::test]
async fn test_plan_without_candidates_is_empty() {
    let (app, _state) = setup_test_app().await;

    let request = json!({"nodes": [a30_node()], "candidatePods": []});
    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["plan"], json!({}));
    assert_eq!(body["changes"], json!([]));
}

#[tokio::test]
async fn test_plan_rejects_invalid_annotation() {
    let (app, _state) = setup_test_app().await;

    let mut node = a30_node();
    node["metadata"]["annotations"] = json!({"n8s.nebuly.ai/status-gpu-0-1g.6gb-busy": "1"});
    let request = json!({"nodes": [node], "candidatePods": [pending_pod("p", "1g.6gb")]});

    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("status-gpu-0"));
}

#[tokio::test]
async fn test_plan_rejects_zero_timeout() {
    let (app, _state) = setup_test_app().await;

    let request = json!({
        "nodes": [a30_node()],
        "candidatePods": [pending_pod("trainer", "1g.6gb")],
        "timeoutSecs": 0
    });
    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("timeoutSecs"));
}

#[tokio::test]
async fn test_plan_accepts_huge_timeout() {
    let (app, _state) = setup_test_app().await;

    let request = json!({
        "nodes": [a30_node()],
        "candidatePods": [pending_pod("trainer", "1g.6gb")],
        "timeoutSecs": u64::MAX
    });
    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["changes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_plan_oracle_failure_degrades_planner() {
    let planner = Planner::new(
        Arc::new(UnreachableOracle),
        Arc::new(SliceCatalog::builtin()),
    );
    let (app, state) = setup_test_app_with(planner).await;

    let request = json!({
        "nodes": [a30_node()],
        "candidatePods": [pending_pod("trainer", "1g.6gb")]
    });
    let response = app.oneshot(post_json("/v1/plan", &request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let health = state.health_registry.health().await;
    assert_eq!(health.status, ComponentStatus::Degraded);
}

#[tokio::test]
async fn test_geometries_known_model() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(get("/v1/geometries/NVIDIA-A30"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["model"], "NVIDIA-A30");
    let geometries = body["geometries"].as_array().unwrap();
    assert_eq!(geometries.len(), 4);
    assert!(geometries.contains(&json!({"1g.6gb": 4})));
}

#[tokio::test]
async fn test_geometries_unknown_model_returns_404() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/v1/geometries/Tesla-T4")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Tesla-T4"));
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    // Run one plan so the planner counters are registered and populated
    let request = json!({
        "nodes": [a30_node()],
        "candidatePods": [pending_pod("trainer", "1g.6gb")]
    });
    let response = app
        .clone()
        .oneshot(post_json("/v1/plan", &request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("mig_partitioner_gpus_searched_total"));
}
