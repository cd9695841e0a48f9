//! Captured observability events.
//!
//! A [`BusEvent`] pairs an [`EventKind`] with an [`EventData`] payload. The
//! payload is a closed set of shapes, one per capture point, plus an
//! [`EventData::Opaque`] escape hatch for arbitrary JSON. Payloads are
//! serialized untagged so the wire form is the bare record object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EventId;

/// Event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Log output from the application.
    Log,
    /// An error raised or reported by the application.
    Error,
    /// An outbound request and its outcome.
    Network,
    /// A snapshot of application state.
    State,
    /// A route or location change.
    Navigation,
    /// A command executed through the registry.
    Command,
}

impl EventKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Error => "error",
            Self::Network => "network",
            Self::State => "state",
            Self::Navigation => "navigation",
            Self::Command => "command",
        }
    }
}

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level diagnostics.
    Trace,
    /// Debug output.
    Debug,
    /// Plain log output.
    Log,
    /// Informational output.
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
}

/// A single log line, split into its stringified arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Stringified arguments.
    pub args: Vec<String>,
}

/// An error report with optional source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable message.
    pub message: String,
    /// Source file or module that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Line number within `filename`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    /// Column number within `filename`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    /// Captured backtrace or stack, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// An observed outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Request URL.
    pub url: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Response status, absent when the request failed before a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    /// Whether the request succeeded (2xx response).
    pub ok: bool,
    /// Transport error, if the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Name of the store the snapshot came from.
    pub name: String,
    /// Serialized state, or an error marker when serialization failed.
    pub data: Value,
}

/// A route or location change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRecord {
    /// Previous location, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// New location.
    pub to: String,
}

/// Record of a command executed through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command name.
    pub name: String,
    /// Payload the command was invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Whether the handler completed successfully.
    pub success: bool,
    /// Stringified failure cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of a [`BusEvent`].
///
/// Variant order matters for deserialization: more specific shapes are
/// tried first and [`EventData::Opaque`] accepts anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    /// Registry execution record.
    Command(CommandRecord),
    /// Outbound request record.
    Network(NetworkRecord),
    /// State snapshot.
    State(StateRecord),
    /// Log line.
    Log(LogRecord),
    /// Error report.
    Error(ErrorReport),
    /// Location change.
    Navigation(NavigationRecord),
    /// Arbitrary JSON.
    Opaque(Value),
}

impl From<LogRecord> for EventData {
    fn from(record: LogRecord) -> Self {
        Self::Log(record)
    }
}

impl From<ErrorReport> for EventData {
    fn from(report: ErrorReport) -> Self {
        Self::Error(report)
    }
}

impl From<NetworkRecord> for EventData {
    fn from(record: NetworkRecord) -> Self {
        Self::Network(record)
    }
}

impl From<StateRecord> for EventData {
    fn from(record: StateRecord) -> Self {
        Self::State(record)
    }
}

impl From<NavigationRecord> for EventData {
    fn from(record: NavigationRecord) -> Self {
        Self::Navigation(record)
    }
}

impl From<CommandRecord> for EventData {
    fn from(record: CommandRecord) -> Self {
        Self::Command(record)
    }
}

impl From<Value> for EventData {
    fn from(value: Value) -> Self {
        Self::Opaque(value)
    }
}

/// An immutable captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique identifier.
    pub id: EventId,
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Event payload.
    pub data: EventData,
}

impl BusEvent {
    /// Returns `true` for `log` and `error` events.
    #[must_use]
    pub const fn is_log_like(&self) -> bool {
        matches!(self.kind, EventKind::Log | EventKind::Error)
    }
}
