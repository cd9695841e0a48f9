//! Connection lifecycle of the bridge client.
//!
//! The reconnect loop drives [`ConnectionState`] through
//! [`ConnectionState::next`], a pure function, so each step can be checked
//! in isolation.

use std::fmt;

/// Where the bridge client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; either not started yet or waiting out the reconnect delay.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; context and commands have been pushed.
    Open,
}

/// Input to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A connection attempt starts.
    Connect,
    /// The handshake completed.
    Opened,
    /// The socket closed, cleanly or not.
    Closed,
    /// The handshake or the socket failed.
    Failed,
}

impl ConnectionState {
    /// Returns the state after applying `transition`.
    ///
    /// Transitions that make no sense from the current state leave it
    /// unchanged.
    #[must_use]
    pub const fn next(self, transition: Transition) -> Self {
        match (self, transition) {
            (Self::Disconnected, Transition::Connect) => Self::Connecting,
            (Self::Connecting, Transition::Opened) => Self::Open,
            (Self::Connecting | Self::Open, Transition::Closed | Transition::Failed) => {
                Self::Disconnected
            }
            (state, _) => state,
        }
    }

    /// Whether frames can be sent.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        };
        f.write_str(s)
    }
}
