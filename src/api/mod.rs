//! HTTP layer: token middleware, read-only handlers and the OpenAPI
//! document.

pub mod auth;
pub mod handlers;

use axum::Router;
use axum::middleware::from_fn_with_state;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::domain::CommandInfo;
use crate::error::{ErrorBody, ErrorResponse};
use handlers::system::{self, HealthResponse};

/// OpenAPI document for the read endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "assist-bridge broker",
        description = "Read-only views of the relay broker. Live traffic goes over the WebSocket endpoint at `/` or `/ws`."
    ),
    paths(
        system::health_handler,
        system::context_handler,
        system::commands_handler,
    ),
    components(schemas(HealthResponse, CommandInfo, ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Broker status"),
        (name = "Introspection", description = "Latest application context and commands"),
    )
)]
pub struct ApiDoc;

/// Builds the read router, guarded by the shared-token middleware.
pub fn build_router(state: &AppState) -> Router<AppState> {
    let router = handlers::routes();

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router.layer(from_fn_with_state(state.clone(), auth::require_token))
}
