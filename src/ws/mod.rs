//! WebSocket layer: the relay broker and its socket plumbing.
//!
//! Every peer connects to the same endpoint. Application peers announce
//! themselves by sending `context` or `commands`; everyone else acts as a
//! controller that observes events and issues `execute` requests.

pub mod broker;
pub mod connection;
pub mod handler;
pub mod peer_id;

pub use broker::Broker;
pub use peer_id::PeerId;
