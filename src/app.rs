//! Axum application assembly.

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::api::handlers::system::not_found;
use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete broker application: socket endpoint at `/` and
/// `/ws`, token-guarded read endpoints, and a structured 404 fallback.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .merge(api::build_router(&state))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
