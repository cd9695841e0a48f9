//! Explicit capture points for logs, errors, navigation and network calls.
//!
//! Applications call into [`Instrumentation`] (or install [`BusLayer`] on
//! their `tracing` subscriber) instead of having global functions patched
//! underneath them. Every capture ends up as a [`crate::domain::BusEvent`].

use std::fmt::{self, Display, Write as _};
use std::future::Future;
use std::time::Instant;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::domain::{
    ErrorReport, EventBus, EventKind, LogLevel, LogRecord, NavigationRecord, NetworkRecord,
};

/// Targets never forwarded by [`BusLayer`]: the bridge's own logging and
/// the WebSocket stack it writes to. Forwarding them would feed every sent
/// frame back into the bus.
const EXCLUDED_TARGETS: &[&str] = &[env!("CARGO_CRATE_NAME"), "tungstenite", "tokio_tungstenite"];

/// Capture helpers bound to one [`EventBus`].
#[derive(Debug, Clone)]
pub struct Instrumentation {
    bus: EventBus,
}

impl Instrumentation {
    /// Creates capture helpers that emit on `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Records a log line. `Error`-level lines are emitted as `error`
    /// events, everything else as `log`.
    pub fn log<I, A>(&self, level: LogLevel, args: I)
    where
        I: IntoIterator<Item = A>,
        A: Display,
    {
        let kind = if level == LogLevel::Error {
            EventKind::Error
        } else {
            EventKind::Log
        };
        let args = args.into_iter().map(|a| a.to_string()).collect();
        self.bus.emit(kind, LogRecord { level, args });
    }

    /// Records an error report.
    pub fn error(&self, report: ErrorReport) {
        self.bus.emit(EventKind::Error, report);
    }

    /// Records an error value, including its source chain in the message.
    pub fn error_from(&self, err: &(dyn std::error::Error + 'static)) {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = write!(message, ": {cause}");
            source = cause.source();
        }
        self.error(ErrorReport {
            message,
            filename: None,
            lineno: None,
            colno: None,
            stack: None,
        });
    }

    /// Records a location change.
    pub fn navigation(&self, from: Option<String>, to: impl Into<String>) {
        self.bus.emit(
            EventKind::Navigation,
            NavigationRecord {
                from,
                to: to.into(),
            },
        );
    }

    /// Records a completed (or failed) outbound request.
    pub fn record_network(&self, record: NetworkRecord) {
        self.bus.emit(EventKind::Network, record);
    }

    /// Awaits `request`, timing it and recording a `network` event.
    ///
    /// `status_of` extracts the HTTP status from a successful response. The
    /// request's result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever error `request` resolves to, after recording it.
    pub async fn observe_request<Fut, T, E, S>(
        &self,
        method: &str,
        url: &str,
        request: Fut,
        status_of: S,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        S: FnOnce(&T) -> u16,
    {
        let started = Instant::now();
        let result = request.await;
        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let record = match &result {
            Ok(response) => {
                let status = status_of(response);
                NetworkRecord {
                    url: url.to_string(),
                    method: method.to_ascii_uppercase(),
                    status: Some(status),
                    duration,
                    ok: (200..300).contains(&status),
                    error: None,
                }
            }
            Err(err) => NetworkRecord {
                url: url.to_string(),
                method: method.to_ascii_uppercase(),
                status: None,
                duration,
                ok: false,
                error: Some(err.to_string()),
            },
        };
        self.record_network(record);
        result
    }
}

/// `tracing` layer forwarding application log events into an [`EventBus`].
///
/// Events at or above `min_level` severity (default `INFO`) become `log`
/// events; `ERROR` events become `error` events. The bridge's own targets
/// are skipped.
#[derive(Debug, Clone)]
pub struct BusLayer {
    bus: EventBus,
    min_level: Level,
}

impl BusLayer {
    /// Creates a layer emitting on `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            min_level: Level::INFO,
        }
    }

    /// Sets the most verbose level that is still forwarded.
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for BusLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level {
            return;
        }
        let target = meta.target();
        if EXCLUDED_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = ArgsVisitor::default();
        event.record(&mut visitor);
        let mut args = Vec::with_capacity(visitor.fields.len() + 1);
        if let Some(message) = visitor.message {
            args.push(message);
        }
        args.extend(visitor.fields);

        let (kind, level) = match *meta.level() {
            Level::ERROR => (EventKind::Error, LogLevel::Error),
            Level::WARN => (EventKind::Log, LogLevel::Warn),
            Level::INFO => (EventKind::Log, LogLevel::Info),
            Level::DEBUG => (EventKind::Log, LogLevel::Debug),
            _ => (EventKind::Log, LogLevel::Trace),
        };
        self.bus.emit(kind, LogRecord { level, args });
    }
}

#[derive(Default)]
struct ArgsVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for ArgsVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}
