//! The in-process bridge client.
//!
//! [`BridgeClient::start`] spawns a task that keeps a socket to the broker
//! open for the lifetime of the client:
//!
//! 1. connect (with the bearer token, if any);
//! 2. on open, push the current context snapshot and the command listing;
//! 3. stream every bus event as its own `event` frame and coalesce context
//!    resyncs to at most one per throttle window;
//! 4. run inbound `execute` requests through the registry and answer with
//!    `executeResult`;
//! 5. after a close or failure, wait the reconnect delay and start over.
//!
//! Events emitted while no socket is open are not replayed; the context
//! snapshot sent on the next open covers them. The outbound queue holds at
//! most `buffer_capacity` events; a session that falls further behind skips
//! the oldest and relies on the next context resync.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::endpoint::{broker_url, handshake_headers};
use super::state::{ConnectionState, Transition};
use super::transport::{self, Inbound, WsReader, WsWriter};
use crate::config::ClientConfig;
use crate::domain::{BusEvent, CommandRegistry, EventBus, Subscription};
use crate::protocol::{Envelope, ProtocolMessage};

/// Handle to a running bridge client.
///
/// Dropping the handle does not stop the task; call
/// [`BridgeClient::shutdown`].
#[derive(Debug)]
pub struct BridgeClient {
    url: String,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeClient {
    /// Starts the reconnect loop on the current tokio runtime.
    #[must_use]
    pub fn start(bus: EventBus, registry: CommandRegistry, config: ClientConfig) -> Self {
        let url = broker_url(&config);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let worker = Worker {
            url: url.clone(),
            headers: handshake_headers(&config),
            bus,
            registry,
            config: Arc::new(config),
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());
        Self {
            url,
            state,
            cancel,
            task,
        }
    }

    /// Broker URL this client connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until the client reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client task has exited.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target).await?;
        Ok(())
    }

    /// Stops the client: closes the socket if open, cancels any pending
    /// reconnect and waits for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "bridge client task ended abnormally");
        }
    }
}

struct Worker {
    url: String,
    headers: Vec<(&'static str, String)>,
    bus: EventBus,
    registry: CommandRegistry,
    config: Arc<ClientConfig>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

enum SessionEnd {
    Closed,
    Cancelled,
}

impl Worker {
    fn advance(&self, transition: Transition) {
        self.state.send_modify(|state| *state = state.next(transition));
    }

    async fn run(self) {
        let (subscription, mut events) = event_queue(&self.bus, self.config.buffer_capacity);

        loop {
            self.advance(Transition::Connect);
            tracing::debug!(url = %self.url, "connecting to broker");

            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = transport::connect(&self.url, &self.headers) => result,
            };

            match connected {
                Ok((writer, reader)) => {
                    self.advance(Transition::Opened);
                    tracing::info!(url = %self.url, "connected to broker");
                    // Start from the tail; the opening snapshot covers the backlog.
                    events = events.resubscribe();

                    let end = self.session(writer, reader, &mut events).await;
                    match end {
                        Ok(SessionEnd::Cancelled) => {
                            self.advance(Transition::Closed);
                            break;
                        }
                        Ok(SessionEnd::Closed) => {
                            self.advance(Transition::Closed);
                            tracing::info!(
                                delay_ms = millis(self.config.reconnect_delay),
                                "disconnected from broker, reconnecting"
                            );
                        }
                        Err(err) => {
                            self.advance(Transition::Failed);
                            tracing::warn!(error = %format!("{err:#}"), "broker session failed");
                        }
                    }
                }
                Err(err) => {
                    self.advance(Transition::Failed);
                    tracing::debug!(error = %format!("{err:#}"), "could not reach broker");
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        subscription.unsubscribe();
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::debug!("bridge client stopped");
    }

    async fn session(
        &self,
        mut writer: WsWriter,
        mut reader: WsReader,
        events: &mut broadcast::Receiver<BusEvent>,
    ) -> Result<SessionEnd> {
        send(&mut writer, ProtocolMessage::context(&self.bus.context())?).await?;
        send(
            &mut writer,
            ProtocolMessage::Commands {
                data: self.registry.list(),
            },
        )
        .await?;

        let (reply_tx, mut replies) = mpsc::unbounded_channel::<ProtocolMessage>();
        let mut resync_at: Option<Instant> = None;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if let Err(err) = writer.close().await {
                        tracing::debug!(error = %err, "close on shutdown failed");
                    }
                    return Ok(SessionEnd::Cancelled);
                }
                inbound = reader.recv() => match inbound {
                    None => return Ok(SessionEnd::Closed),
                    Some(Err(err)) => return Err(err),
                    Some(Ok(Inbound::Close { code, reason })) => {
                        if code == 1008 {
                            tracing::warn!(code, %reason, "broker rejected the token");
                        } else {
                            tracing::debug!(code, %reason, "broker closed the socket");
                        }
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(Inbound::Text(text))) => self.dispatch(&text, &reply_tx),
                },
                event = events.recv() => {
                    match event {
                        Ok(event) => send(&mut writer, ProtocolMessage::Event { data: event }).await?,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event queue overflowed, skipping oldest events");
                        }
                        Err(RecvError::Closed) => return Ok(SessionEnd::Closed),
                    }
                    if resync_at.is_none() {
                        resync_at = Some(Instant::now() + self.config.context_throttle);
                    }
                }
                Some(reply) = replies.recv() => send(&mut writer, reply).await?,
                () = tokio::time::sleep_until(resync_at.unwrap_or_else(Instant::now)), if resync_at.is_some() => {
                    resync_at = None;
                    send(&mut writer, ProtocolMessage::context(&self.bus.context())?).await?;
                }
            }
        }
    }

    fn dispatch(&self, text: &str, reply_tx: &mpsc::UnboundedSender<ProtocolMessage>) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed frame from broker");
                return;
            }
        };
        match envelope.message {
            ProtocolMessage::Execute {
                command,
                payload,
                request_id,
            } => {
                tracing::debug!(%command, %request_id, "executing remote command");
                let registry = self.registry.clone();
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let result = registry.execute(&command, payload).await;
                    // Session may have ended; the result is then lost with it.
                    let _ = reply_tx.send(ProtocolMessage::ExecuteResult { request_id, result });
                });
            }
            other => tracing::trace!(kind = other.type_str(), "ignoring broker frame"),
        }
    }
}

/// Subscribes a bounded queue of bus events. Once `capacity` events are
/// waiting, each new one evicts the oldest and the receiver reports the
/// skip as [`RecvError::Lagged`].
fn event_queue(bus: &EventBus, capacity: usize) -> (Subscription, broadcast::Receiver<BusEvent>) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    let subscription = bus.subscribe(move |event| {
        // No receiver only while the worker is exiting.
        let _ = tx.send(event.clone());
    });
    (subscription, rx)
}

async fn send(writer: &mut WsWriter, message: ProtocolMessage) -> Result<()> {
    let frame = Envelope::new(message).to_json()?;
    writer.send_text(frame).await
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
