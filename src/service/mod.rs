//! Capture services layered on top of the event bus.
//!
//! These are the explicit instrumentation points an application calls into
//! so its logs, errors, requests and state reach the bridge.

pub mod instrumentation;
pub mod state_store;

pub use instrumentation::{BusLayer, Instrumentation};
pub use state_store::InstrumentedStore;
