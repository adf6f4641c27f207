//! HTTP API for health checks, Prometheus metrics and container events

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use boot_lib::{
    events::{Action, ContainerEvent, EventBus},
    health::{ComponentStatus, HealthRegistry},
    registry::ManagerRegistry,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Source recorded on events published without one
const DEFAULT_EVENT_SOURCE: &str = "api";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ManagerRegistry>,
    pub bus: EventBus,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(registry: Arc<ManagerRegistry>, bus: EventBus, health_registry: HealthRegistry) -> Self {
        Self {
            registry,
            bus,
            health_registry,
        }
    }
}

/// Body of an event publish request
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub action: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub event: ContainerEvent,
    /// Listeners that received the event
    pub delivered_to: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .health_registry
        .refresh(&state.registry.statuses())
        .await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once host start has completed
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
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_containers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.statuses())
}

async fn get_container(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    match state.registry.get(&key) {
        Some(manager) => Json(manager.status()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown container '{}'", key)),
    }
}

/// Publish an event to one manager
async fn publish_to_container(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Response {
    if state.registry.get(&key).is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("unknown container '{}'", key));
    }
    publish(&state, request, Some(key))
}

/// Publish an event to every manager
async fn broadcast(State(state): State<Arc<AppState>>, Json(request): Json<PublishRequest>) -> Response {
    publish(&state, request, None)
}

fn publish(state: &AppState, request: PublishRequest, target: Option<String>) -> Response {
    let action = Action::from(request.action.as_str());
    if !action.is_recognized() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown action '{}', expected START, STOP or REMOVE", request.action),
        );
    }

    let source = request
        .source
        .unwrap_or_else(|| DEFAULT_EVENT_SOURCE.to_string());
    let mut event = ContainerEvent::new(source, action);
    if let Some(key) = target {
        event = event.for_container(key);
    }

    let delivered_to = state.bus.publish(event.clone());
    info!(event = %event, delivered_to = delivered_to, "Event published via API");

    (
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            event,
            delivered_to,
        }),
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/containers", get(list_containers))
        .route("/api/v1/containers/:key", get(get_container))
        .route("/api/v1/containers/:key/events", post(publish_to_container))
        .route("/api/v1/events", post(broadcast))
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled
pub async fn serve(port: u16, state: Arc<AppState>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
