//! Read-only broker endpoints: health, latest context, latest commands.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::CommandInfo;
use crate::error::{BridgeError, ErrorResponse};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the broker is serving.
    pub status: String,
    /// Connected peers of any kind.
    pub clients: usize,
    /// Peers that have announced context or commands.
    pub app_clients: usize,
    /// `execute` requests awaiting a result.
    pub pending_requests: usize,
    /// Broker version.
    pub version: String,
}

/// `GET /health`: Broker health and peer count.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns broker status and the number of connected peers.",
    responses(
        (status = 200, description = "Broker is serving", body = HealthResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let broker = &state.broker;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            clients: broker.peer_count(),
            app_clients: broker.app_peer_count(),
            pending_requests: broker.pending_count(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /context`: Latest context snapshot announced by an application.
#[utoipa::path(
    get,
    path = "/context",
    tag = "Introspection",
    summary = "Latest context snapshot",
    description = "Returns the most recent context an application peer sent, or an empty snapshot if none has.",
    responses(
        (status = 200, description = "Context snapshot", body = serde_json::Value),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn context_handler(State(state): State<AppState>) -> Json<Value> {
    Json(state.broker.latest_context())
}

/// `GET /commands`: Latest command listing announced by an application.
#[utoipa::path(
    get,
    path = "/commands",
    tag = "Introspection",
    summary = "Latest command listing",
    description = "Returns the command listing exactly as the application sent it, or an empty array if none has.",
    responses(
        (status = 200, description = "Registered commands", body = Vec<CommandInfo>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    )
)]
pub async fn commands_handler(State(state): State<AppState>) -> Json<Value> {
    Json(state.broker.commands())
}

/// Fallback for unmatched paths.
pub async fn not_found(uri: Uri) -> BridgeError {
    BridgeError::NotFound(uri.path().to_string())
}

/// Read routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/context", get(context_handler))
        .route("/commands", get(commands_handler))
}
