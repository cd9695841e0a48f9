//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::ws::Broker;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay core shared by every socket task.
    pub broker: Arc<Broker>,
    /// Startup configuration (token, timeouts).
    pub config: Arc<BrokerConfig>,
}

impl AppState {
    /// Builds the state for a broker configured by `config`.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            broker: Arc::new(Broker::new(config.execution_timeout)),
            config: Arc::new(config),
        }
    }
}
