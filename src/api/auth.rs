//! Shared-token authentication for sockets and read endpoints.
//!
//! A token may be presented as a `token` query parameter, as an
//! `Authorization: Bearer <token>` header, or both; the request is accepted
//! if either matches. When the broker has no token configured every request
//! is accepted.

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::BridgeError;

/// Query parameters carrying an optional token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    /// Shared token, if presented in the query string.
    pub token: Option<String>,
}

/// Returns every token presented by a request: the query parameter, then
/// the bearer header.
pub fn presented_tokens<'a>(
    query: Option<&'a str>,
    headers: &'a HeaderMap,
) -> impl Iterator<Item = &'a str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    query.into_iter().chain(bearer)
}

/// Checks presented tokens against the configured one; any match is enough.
#[must_use]
pub fn is_authorized<'a>(
    expected: Option<&str>,
    presented: impl IntoIterator<Item = &'a str>,
) -> bool {
    match expected {
        None => true,
        Some(expected) => presented.into_iter().any(|p| p == expected),
    }
}

/// Middleware rejecting read requests without a valid token.
///
/// # Errors
///
/// Returns [`BridgeError::Unauthorized`] (HTTP 401) when a token is
/// configured and the request does not present it.
pub async fn require_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, BridgeError> {
    let presented = presented_tokens(query.token.as_deref(), &headers);
    if !is_authorized(state.config.token.as_deref(), presented) {
        tracing::warn!(path = %request.uri().path(), "rejected unauthorized read");
        return Err(BridgeError::Unauthorized);
    }
    Ok(next.run(request).await)
}
