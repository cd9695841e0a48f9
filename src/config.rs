//! Broker and bridge client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Parsing goes through a lookup closure so
//! the same code path is exercised by tests without touching the process
//! environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::domain::EventBus;
use crate::error::BridgeError;

/// Default broker port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default time the broker waits for an `executeResult`.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Default delay between bridge client reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

/// Default minimum spacing between context resyncs.
pub const DEFAULT_CONTEXT_THROTTLE: Duration = Duration::from_millis(500);

/// Output format for the broker's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable `fmt` output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Broker server configuration.
///
/// Loaded once at startup via [`BrokerConfig::from_env`] and checked with
/// [`BrokerConfig::validate`] before binding.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Socket address to bind (`ASSIST_HOST`:`ASSIST_PORT`).
    pub listen_addr: SocketAddr,

    /// Shared secret every socket and HTTP read must present.
    pub token: Option<String>,

    /// How long a forwarded `execute` may stay unanswered.
    pub execution_timeout: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            token: None,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            log_format: LogFormat::Pretty,
        }
    }
}

impl BrokerConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable                   | Default     |
    /// |----------------------------|-------------|
    /// | `ASSIST_HOST`              | `127.0.0.1` |
    /// | `ASSIST_PORT`              | `3001`      |
    /// | `VIBE_ASSIST_TOKEN`        | unset       |
    /// | `ASSIST_EXECUTION_TIMEOUT` | `15000` ms  |
    /// | `LOG_FORMAT`               | `pretty`    |
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `ASSIST_HOST` or `ASSIST_PORT` is
    /// set but cannot be parsed.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BrokerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("ASSIST_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let ip = parse_host(&host)?;

        let port = match lookup("ASSIST_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| BridgeError::Config(format!("ASSIST_PORT={raw} is not a port")))?,
            None => DEFAULT_PORT,
        };

        let execution_timeout = Duration::from_millis(parse_or(
            &lookup,
            "ASSIST_EXECUTION_TIMEOUT",
            15_000,
        ));

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr: SocketAddr::new(ip, port),
            token: non_empty(lookup("VIBE_ASSIST_TOKEN")),
            execution_timeout,
            log_format,
        })
    }

    /// Refuses configurations that would expose the broker beyond the local
    /// machine without authentication.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnprotectedBind`] when the bind address is not
    /// loopback and no token is configured.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.listen_addr.ip().is_loopback() && self.token.is_none() {
            return Err(BridgeError::UnprotectedBind {
                addr: self.listen_addr,
            });
        }
        Ok(())
    }
}

/// Bridge client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Explicit broker URL; bypasses origin derivation when set.
    pub url_override: Option<String>,

    /// Origin the application is served from (e.g. `https://app.local:5173`).
    pub origin: Option<String>,

    /// Broker port used with a derived address.
    pub port: u16,

    /// Shared secret sent as a bearer token.
    pub token: Option<String>,

    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,

    /// Minimum spacing between context resyncs.
    pub context_throttle: Duration,

    /// Capacity of the application's event buffer, and of the client's
    /// outbound event queue.
    pub buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url_override: None,
            origin: None,
            port: DEFAULT_PORT,
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            context_throttle: DEFAULT_CONTEXT_THROTTLE,
            buffer_capacity: crate::domain::event_bus::DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable                     | Default   |
    /// |------------------------------|-----------|
    /// | `ASSIST_URL`                 | unset     |
    /// | `ASSIST_ORIGIN`              | unset     |
    /// | `ASSIST_PORT`                | `3001`    |
    /// | `VIBE_ASSIST_TOKEN`          | unset     |
    /// | `ASSIST_RECONNECT_DELAY_MS`  | `5000`    |
    /// | `ASSIST_CONTEXT_THROTTLE_MS` | `500`     |
    /// | `ASSIST_BUFFER_CAPACITY`     | `500`     |
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup. Invalid numeric
    /// values fall back to their defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            url_override: non_empty(lookup("ASSIST_URL")),
            origin: non_empty(lookup("ASSIST_ORIGIN")),
            port: parse_or(&lookup, "ASSIST_PORT", defaults.port),
            token: non_empty(lookup("VIBE_ASSIST_TOKEN")),
            reconnect_delay: Duration::from_millis(parse_or(
                &lookup,
                "ASSIST_RECONNECT_DELAY_MS",
                5_000,
            )),
            context_throttle: Duration::from_millis(parse_or(
                &lookup,
                "ASSIST_CONTEXT_THROTTLE_MS",
                500,
            )),
            buffer_capacity: parse_or(&lookup, "ASSIST_BUFFER_CAPACITY", defaults.buffer_capacity),
        }
    }

    /// Creates an event bus sized by `buffer_capacity`.
    #[must_use]
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.buffer_capacity)
    }
}

/// Parses a looked-up value as `T`, returning `default` on missing or
/// invalid values.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_host(host: &str) -> Result<IpAddr, BridgeError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    host.trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("ASSIST_HOST={host} is not an IP address")))
}
