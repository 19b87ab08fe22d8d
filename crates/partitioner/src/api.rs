//! HTTP API: planning, catalog lookups, health checks and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod as K8sPod};
use partitioner_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    planner::GpuChange,
    snapshot::k8s::{candidate_from_k8s, snapshot_from_k8s},
    CandidatePod, Geometry, GpuModel, Plan, PlanContext, PlanError, Planner,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub planner: Planner,
    pub default_timeout: Duration,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, planner: Planner, default_timeout: Duration) -> Self {
        Self {
            health_registry,
            planner,
            default_timeout,
        }
    }
}

/// Body of `POST /v1/plan`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub nodes: Vec<K8sNode>,
    #[serde(default)]
    pub scheduled_pods: Vec<K8sPod>,
    pub candidate_pods: Vec<K8sPod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub plan: Plan,
    pub changes: Vec<GpuChange>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeometriesResponse {
    pub model: GpuModel,
    pub geometries: Vec<Geometry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Compute a plan from Kubernetes objects
async fn plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let snapshot = snapshot_from_k8s(&request.nodes, &request.scheduled_pods)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let candidates = request
        .candidate_pods
        .iter()
        .map(candidate_from_k8s)
        .collect::<Result<Vec<CandidatePod>, _>>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let timeout = match request.timeout_secs {
        Some(0) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "timeoutSecs must be at least 1",
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => state.default_timeout,
    };
    let ctx = PlanContext::background().with_timeout(timeout);

    match state.planner.plan(&ctx, &snapshot, &candidates).await {
        Ok(plan) => {
            state.health_registry.set_healthy(components::PLANNER).await;
            let changes = plan.changes(&snapshot);
            info!(
                nodes = snapshot.len(),
                candidate_pods = candidates.len(),
                changes = changes.len(),
                "Plan served"
            );
            Ok(Json(PlanResponse {
                plan,
                changes,
                generated_at: Utc::now(),
            }))
        }
        Err(err) => {
            let status = match &err {
                PlanError::Oracle(_) => StatusCode::BAD_GATEWAY,
                PlanError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
                PlanError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status.is_server_error() && !err.is_cancelled() {
                state
                    .health_registry
                    .set_degraded(components::PLANNER, err.to_string())
                    .await;
            }
            warn!(error = %err, status = status.as_u16(), "Plan request failed");
            Err(api_error(status, err.to_string()))
        }
    }
}

/// Allowed geometries of one GPU model
async fn geometries(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<GeometriesResponse>, ApiError> {
    let model = GpuModel::new(model);
    let catalog = state.planner.catalog();
    if !catalog.is_known(&model) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("unknown GPU model '{}'", model),
        ));
    }
    Ok(Json(GeometriesResponse {
        geometries: catalog.geometries_for(&model).to_vec(),
        model,
    }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/plan", post(plan))
        .route("/v1/geometries/:model", get(geometries))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
