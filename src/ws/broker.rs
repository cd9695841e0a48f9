//! Broker routing core: peer classification, event relay and
//! request/response correlation.
//!
//! [`Broker`] owns every piece of shared relay state behind a single mutex:
//! the connected peers, the application-peer activity marks, the pending
//! request table, and the latest context and command listing. Socket tasks
//! feed it raw frames via [`Broker::handle_text`] and drain their outbound
//! queue from the receiver returned by [`Broker::register_peer`].
//!
//! # Routing
//!
//! A peer becomes an *application peer* the first time it sends `context`
//! or `commands`, and every such message refreshes its activity mark. An
//! `execute` from any peer is forwarded to the open application peer with
//! the most recent mark. Marks come from a logical clock, so two peers
//! marked within the same millisecond still have a strict order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::PeerId;
use crate::domain::{CommandOutcome, ContextSnapshot};
use crate::protocol::{Envelope, ProtocolMessage, RoutingFrame};

/// Failure returned when no application peer can take an `execute`.
pub const NO_APP_CLIENT_ERROR: &str = "No app client connected to execute commands";

/// Failure returned when the application never answers an `execute`.
pub const TIMEOUT_ERROR: &str = "Command timed out waiting for executeResult";

/// Failure returned when an `execute` reuses an in-flight request id.
pub const DUPLICATE_REQUEST_ERROR: &str = "Duplicate requestId already pending";

/// Outbound queue of serialized frames for one peer.
pub type PeerSender = mpsc::UnboundedSender<String>;

#[derive(Debug)]
struct PeerHandle {
    tx: PeerSender,
}

#[derive(Debug)]
struct PendingRequest {
    requester: PeerId,
    target: PeerId,
    generation: u64,
    timer: AbortHandle,
}

#[derive(Debug)]
struct BrokerState {
    peers: HashMap<PeerId, PeerHandle>,
    app_peers: HashMap<PeerId, u64>,
    pending: HashMap<String, PendingRequest>,
    activity_clock: u64,
    next_generation: u64,
    latest_context: Value,
    commands: Value,
}

impl BrokerState {
    fn new() -> Self {
        Self {
            peers: HashMap::new(),
            app_peers: HashMap::new(),
            pending: HashMap::new(),
            activity_clock: 0,
            next_generation: 0,
            latest_context: serde_json::to_value(ContextSnapshot::default())
                .unwrap_or(Value::Null),
            commands: Value::Array(Vec::new()),
        }
    }

    fn is_open(&self, peer: PeerId) -> bool {
        self.peers.get(&peer).is_some_and(|p| !p.tx.is_closed())
    }

    fn mark_active(&mut self, peer: PeerId) {
        self.activity_clock += 1;
        self.app_peers.insert(peer, self.activity_clock);
    }

    fn active_app_peer(&self) -> Option<PeerId> {
        self.app_peers
            .iter()
            .filter(|(peer, _)| self.is_open(**peer))
            .max_by_key(|(_, seen)| **seen)
            .map(|(peer, _)| *peer)
    }

    fn send_raw(&self, peer: PeerId, frame: String) {
        if let Some(handle) = self.peers.get(&peer)
            && handle.tx.send(frame).is_err()
        {
            tracing::debug!(%peer, "dropping frame for closing peer");
        }
    }

    fn send(&self, peer: PeerId, message: ProtocolMessage) {
        match Envelope::new(message).to_json() {
            Ok(frame) => self.send_raw(peer, frame),
            Err(err) => tracing::error!(%peer, error = %err, "failed to serialize frame"),
        }
    }

    fn send_outcome(&self, peer: PeerId, request_id: String, result: CommandOutcome) {
        self.send(peer, ProtocolMessage::ExecuteResult { request_id, result });
    }
}

/// Central relay between application peers and controller peers.
#[derive(Debug)]
pub struct Broker {
    state: Mutex<BrokerState>,
    execution_timeout: Duration,
}

impl Broker {
    /// Creates a broker whose forwarded requests expire after
    /// `execution_timeout`.
    #[must_use]
    pub fn new(execution_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState::new()),
            execution_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a new peer and queues its `connected` acknowledgement.
    ///
    /// Frames for the peer are delivered, in order, on the returned
    /// receiver.
    pub fn register_peer(&self) -> (PeerId, mpsc::UnboundedReceiver<String>) {
        let peer = PeerId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.peers.insert(peer, PeerHandle { tx });
        state.send(
            peer,
            ProtocolMessage::Connected {
                timestamp: Utc::now().timestamp_millis(),
            },
        );
        tracing::info!(%peer, peers = state.peers.len(), "peer connected");
        (peer, rx)
    }

    /// Removes a disconnected peer.
    ///
    /// Requests the peer was waiting on are discarded. Requests the peer was
    /// expected to answer are left to expire through their timeout.
    pub fn remove_peer(&self, peer: PeerId) {
        let mut state = self.lock();
        state.peers.remove(&peer);
        state.app_peers.remove(&peer);
        state.pending.retain(|request_id, pending| {
            if pending.requester == peer {
                tracing::debug!(%peer, %request_id, "discarding request of departed peer");
                pending.timer.abort();
                false
            } else {
                true
            }
        });
        tracing::info!(%peer, peers = state.peers.len(), "peer disconnected");
    }

    /// Handles one text frame received from `from`.
    ///
    /// Only the routing fields are interpreted; `event` and `executeResult`
    /// frames are forwarded as the exact text received. Malformed frames are
    /// logged and dropped; the connection stays open.
    pub fn handle_text(self: &Arc<Self>, from: PeerId, text: &str) {
        let frame = match RoutingFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(peer = %from, error = %err, "dropping malformed frame");
                return;
            }
        };

        match frame.kind.as_str() {
            "context" => {
                let mut state = self.lock();
                state.latest_context = frame.data.unwrap_or(Value::Null);
                state.mark_active(from);
            }
            "commands" => {
                let mut state = self.lock();
                let data = frame.data.unwrap_or_else(|| Value::Array(Vec::new()));
                tracing::debug!(
                    peer = %from,
                    count = data.as_array().map_or(0, Vec::len),
                    "command listing updated"
                );
                state.commands = data;
                state.mark_active(from);
            }
            "event" => {
                let state = self.lock();
                for peer in state.peers.keys().filter(|p| **p != from) {
                    state.send_raw(*peer, text.to_string());
                }
            }
            "execute" => match (frame.command, frame.request_id) {
                (Some(command), Some(request_id)) => {
                    self.route_execute(from, command, frame.payload, request_id);
                }
                _ => tracing::warn!(peer = %from, "dropping execute without command or requestId"),
            },
            "executeResult" => {
                let Some(request_id) = frame.request_id else {
                    tracing::warn!(peer = %from, "dropping executeResult without requestId");
                    return;
                };
                let mut state = self.lock();
                match state.pending.remove(&request_id) {
                    Some(pending) => {
                        pending.timer.abort();
                        state.send_raw(pending.requester, text.to_string());
                    }
                    None => {
                        tracing::debug!(peer = %from, %request_id, "discarding unmatched executeResult");
                    }
                }
            }
            "connected" => {}
            other => tracing::warn!(peer = %from, kind = other, "dropping frame of unknown type"),
        }
    }

    fn route_execute(
        self: &Arc<Self>,
        requester: PeerId,
        command: String,
        payload: Option<Value>,
        request_id: String,
    ) {
        let mut state = self.lock();

        let Some(target) = state.active_app_peer() else {
            tracing::warn!(%requester, %request_id, %command, "no app client for execute");
            state.send_outcome(
                requester,
                request_id,
                CommandOutcome::failure(NO_APP_CLIENT_ERROR),
            );
            return;
        };

        if state.pending.contains_key(&request_id) {
            tracing::warn!(%requester, %request_id, "execute reuses an in-flight requestId");
            state.send_outcome(
                requester,
                request_id,
                CommandOutcome::failure(DUPLICATE_REQUEST_ERROR),
            );
            return;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let broker = Arc::clone(self);
        let timeout = self.execution_timeout;
        let expiring_id = request_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            broker.expire(&expiring_id, generation);
        })
        .abort_handle();

        tracing::debug!(%requester, %target, %request_id, %command, "forwarding execute");
        state.pending.insert(
            request_id.clone(),
            PendingRequest {
                requester,
                target,
                generation,
                timer,
            },
        );
        state.send(
            target,
            ProtocolMessage::Execute {
                command,
                payload,
                request_id,
            },
        );
    }

    fn expire(&self, request_id: &str, generation: u64) {
        let mut state = self.lock();
        let is_current = state
            .pending
            .get(request_id)
            .is_some_and(|p| p.generation == generation);
        if !is_current {
            return;
        }
        if let Some(pending) = state.pending.remove(request_id) {
            tracing::warn!(
                request_id,
                requester = %pending.requester,
                target = %pending.target,
                "execute timed out"
            );
            state.send_outcome(
                pending.requester,
                request_id.to_string(),
                CommandOutcome::failure(TIMEOUT_ERROR),
            );
        }
    }

    /// Number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Number of peers classified as application peers.
    #[must_use]
    pub fn app_peer_count(&self) -> usize {
        self.lock().app_peers.len()
    }

    /// Number of in-flight `execute` requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// The peer an `execute` would be routed to right now.
    #[must_use]
    pub fn active_app_peer(&self) -> Option<PeerId> {
        self.lock().active_app_peer()
    }

    /// Most recently received context snapshot, verbatim.
    #[must_use]
    pub fn latest_context(&self) -> Value {
        self.lock().latest_context.clone()
    }

    /// Most recently received command listing, verbatim.
    #[must_use]
    pub fn commands(&self) -> Value {
        self.lock().commands.clone()
    }
}
