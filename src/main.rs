//! assist-broker entry point.
//!
//! Starts the relay broker: WebSocket endpoint plus read-only HTTP views.

use assist_bridge::app::build_app;
use assist_bridge::app_state::AppState;
use assist_bridge::config::{BrokerConfig, LogFormat};
use assist_bridge::error::BridgeError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    // Load configuration
    let config = BrokerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    config.validate()?;
    tracing::info!(
        addr = %config.listen_addr,
        auth = config.token.is_some(),
        timeout_ms = u64::try_from(config.execution_timeout.as_millis()).unwrap_or(u64::MAX),
        "starting assist-broker"
    );

    let listen_addr = config.listen_addr;
    let app = build_app(AppState::new(config));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "broker listening");

    axum::serve(listener, app).await?;

    Ok(())
}
