//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::api::auth::{TokenQuery, is_authorized, presented_tokens};
use crate::app_state::AppState;

/// `GET /` and `GET /ws`: upgrade to a broker socket.
///
/// When a token is configured and not presented, the socket is upgraded
/// and immediately closed with policy-violation code 1008 before any
/// `connected` acknowledgement.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let authorized = is_authorized(
        state.config.token.as_deref(),
        presented_tokens(query.token.as_deref(), &headers),
    );
    let broker = Arc::clone(&state.broker);

    ws.on_upgrade(move |socket| async move {
        if authorized {
            run_connection(socket, broker).await;
        } else {
            reject(socket).await;
        }
    })
}

async fn reject(mut socket: WebSocket) {
    tracing::warn!("rejecting socket with missing or invalid token");
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "Unauthorized".into(),
    };
    if let Err(err) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %err, "failed to send close frame");
    }
}
