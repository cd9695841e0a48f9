//! Bridge client: the application side of the relay.
//!
//! [`BridgeClient`] connects an application's [`EventBus`](crate::domain::EventBus)
//! and [`CommandRegistry`](crate::domain::CommandRegistry) to a broker and
//! keeps reconnecting until shut down.

pub mod bridge;
pub mod endpoint;
pub mod state;
pub mod transport;

pub use bridge::BridgeClient;
pub use state::{ConnectionState, Transition};
