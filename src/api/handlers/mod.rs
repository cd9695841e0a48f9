//! REST endpoint handlers.

pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all read-only routes.
pub fn routes() -> Router<AppState> {
    system::routes()
}
