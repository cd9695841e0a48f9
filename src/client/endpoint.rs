//! Broker address derivation.
//!
//! An explicit URL always wins. Otherwise the address is derived from the
//! origin the application runs under: `https` maps to `wss`, anything else
//! to `ws`, the origin's host is kept and the broker port is appended. With
//! neither, the broker is assumed on `localhost`.

use crate::config::ClientConfig;

/// Resolves the broker URL for `config`.
#[must_use]
pub fn broker_url(config: &ClientConfig) -> String {
    if let Some(url) = &config.url_override {
        return http_to_ws_scheme(url);
    }
    match &config.origin {
        Some(origin) => from_origin(origin, config.port),
        None => format!("ws://localhost:{}", config.port),
    }
}

/// Headers to send with the handshake.
#[must_use]
pub fn handshake_headers(config: &ClientConfig) -> Vec<(&'static str, String)> {
    config
        .token
        .as_ref()
        .map(|token| vec![("Authorization", format!("Bearer {token}"))])
        .unwrap_or_default()
}

/// Converts an HTTP(S) URL to the WS(S) scheme. `ws://` and `wss://` pass
/// through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn from_origin(origin: &str, port: u16) -> String {
    let (scheme, rest) = match origin.split_once("://") {
        Some(("https" | "wss", rest)) => ("wss", rest),
        Some((_, rest)) => ("ws", rest),
        None => ("ws", origin),
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = strip_port(authority);
    let host = if host.is_empty() { "localhost" } else { host };
    format!("{scheme}://{host}:{port}")
}

fn strip_port(authority: &str) -> &str {
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if authority.starts_with('[') {
        // IPv6 literal: keep the brackets.
        return authority
            .find(']')
            .and_then(|end| authority.get(..=end))
            .unwrap_or(authority);
    }
    authority.split(':').next().unwrap_or(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>, origin: Option<&str>) -> ClientConfig {
        ClientConfig {
            url_override: url.map(str::to_string),
            origin: origin.map(str::to_string),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn defaults_to_localhost() {
        assert_eq!(broker_url(&config(None, None)), "ws://localhost:3001");
    }

    #[test]
    fn https_origin_maps_to_wss() {
        assert_eq!(
            broker_url(&config(None, Some("https://app.example:5173/todos"))),
            "wss://app.example:3001"
        );
    }

    #[test]
    fn http_origin_maps_to_ws() {
        assert_eq!(
            broker_url(&config(None, Some("http://192.168.1.20:5173"))),
            "ws://192.168.1.20:3001"
        );
    }

    #[test]
    fn ipv6_origin_keeps_brackets() {
        assert_eq!(
            broker_url(&config(None, Some("http://[::1]:5173"))),
            "ws://[::1]:3001"
        );
    }

    #[test]
    fn override_wins_and_is_normalized() {
        assert_eq!(
            broker_url(&config(Some("https://broker.internal/ws"), Some("http://x"))),
            "wss://broker.internal/ws"
        );
        assert_eq!(
            broker_url(&config(Some("ws://127.0.0.1:4000"), None)),
            "ws://127.0.0.1:4000"
        );
    }

    #[test]
    fn token_becomes_bearer_header() {
        let mut cfg = ClientConfig::default();
        assert!(handshake_headers(&cfg).is_empty());
        cfg.token = Some("secret-123".to_string());
        assert_eq!(
            handshake_headers(&cfg),
            vec![("Authorization", "Bearer secret-123".to_string())]
        );
    }
}
