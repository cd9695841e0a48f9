//! # assist-bridge
//!
//! Development-time introspection bridge. A running application records
//! logs, errors, network activity, state changes and navigation on an
//! [`EventBus`](domain::EventBus), publishes named commands through a
//! [`CommandRegistry`](domain::CommandRegistry), and streams both to a
//! relay broker through a [`BridgeClient`](client::BridgeClient). External
//! controllers connect to the same broker to watch the event stream and
//! invoke commands remotely.
//!
//! ## Architecture
//!
//! ```text
//! Application process                     Broker (assist-broker)
//!     │                                       │
//!     ├── Instrumentation / BusLayer          ├── WS Handler (ws/)
//!     ├── InstrumentedStore (service/)        ├── Broker routing core
//!     │                                       ├── Read endpoints (api/)
//!     ├── EventBus ── CommandRegistry         │
//!     │        (domain/)                      │
//!     └── BridgeClient (client/) ◄──── ws ───►┤◄──── ws ──── Controllers
//! ```

pub mod api;
pub mod app;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod service;
pub mod ws;
