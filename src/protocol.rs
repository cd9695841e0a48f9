//! Wire protocol shared by the broker and the bridge client.
//!
//! Every frame is a JSON object with a `type` discriminator and a protocol
//! version `v`:
//!
//! ```json
//! { "v": 1, "type": "execute", "command": "addTodo", "payload": "Buy Milk", "requestId": "r1" }
//! ```
//!
//! Frames without `v` are treated as version 1.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{BusEvent, CommandInfo, CommandOutcome, ContextSnapshot};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

const fn default_version() -> u32 {
    PROTOCOL_VERSION
}

/// A versioned protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub v: u32,
    /// Message body.
    #[serde(flatten)]
    pub message: ProtocolMessage,
}

/// Message variants, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProtocolMessage {
    /// Broker → peer acknowledgement sent once a connection is accepted.
    Connected {
        /// Broker time in milliseconds since the Unix epoch.
        #[serde(default)]
        timestamp: i64,
    },
    /// Application → broker context snapshot.
    ///
    /// Kept as raw JSON: the broker stores and serves it verbatim.
    Context {
        /// Serialized [`ContextSnapshot`].
        data: Value,
    },
    /// Application → broker command listing.
    Commands {
        /// Registered commands.
        data: Vec<CommandInfo>,
    },
    /// A single captured event, relayed to every other peer.
    Event {
        /// The event.
        data: BusEvent,
    },
    /// Request to run a command on the application.
    Execute {
        /// Command name.
        command: String,
        /// Command payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Correlation id echoed by the matching `executeResult`.
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// Outcome of an `execute` request.
    ExecuteResult {
        /// Correlation id of the originating `execute`.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Execution outcome.
        result: CommandOutcome,
    },
}

impl ProtocolMessage {
    /// Builds a `context` message from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be converted to JSON.
    pub fn context(snapshot: &ContextSnapshot) -> Result<Self, serde_json::Error> {
        Ok(Self::Context {
            data: serde_json::to_value(snapshot)?,
        })
    }

    /// Returns the wire name of this message's type.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Context { .. } => "context",
            Self::Commands { .. } => "commands",
            Self::Event { .. } => "event",
            Self::Execute { .. } => "execute",
            Self::ExecuteResult { .. } => "executeResult",
        }
    }
}

impl Envelope {
    /// Wraps `message` with the current protocol version.
    #[must_use]
    pub const fn new(message: ProtocolMessage) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            message,
        }
    }

    /// Parses a frame.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON, an unknown `type`, or missing
    /// required fields.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload value cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The fields a relay needs to classify and route a frame, with every body
/// kept as raw JSON.
///
/// The broker parses inbound frames into this view instead of
/// [`Envelope`], so `event` and `executeResult` bodies it does not
/// understand are still relayed unchanged.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutingFrame {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub v: u32,
    /// Wire message type (`context`, `event`, `execute`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Correlation id of `execute` / `executeResult`.
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
    /// Command name of an `execute`.
    #[serde(default)]
    pub command: Option<String>,
    /// Command payload of an `execute`.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Body of `context`, `commands` and `event`.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RoutingFrame {
    /// Parses the routing view of a frame.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or a frame without a string `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<ProtocolMessage> for Envelope {
    fn from(message: ProtocolMessage) -> Self {
        Self::new(message)
    }
}
