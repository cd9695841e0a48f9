//! Per-socket read/write loop.
//!
//! Inbound text frames are handed to the [`Broker`]; frames the broker
//! queues for this peer are written back to the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::Broker;

/// Runs the read/write loop for a single broker peer until either side
/// closes.
pub async fn run_connection(socket: WebSocket, broker: Arc<Broker>) {
    let (peer, mut outbound) = broker.register_peer();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => broker.handle_text(peer, text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => broker.handle_text(peer, text),
                        Err(_) => tracing::warn!(%peer, "dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%peer, error = %err, "socket read failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    broker.remove_peer(peer);
}
