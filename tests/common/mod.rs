//! Shared helpers: a real broker on an ephemeral port and raw socket peers.

#![allow(clippy::panic, dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assist_bridge::app::build_app;
use assist_bridge::app_state::AppState;
use assist_bridge::config::BrokerConfig;
use assist_bridge::ws::Broker;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

pub type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

/// A broker serving on `127.0.0.1:<ephemeral>`.
pub struct TestBroker {
    pub addr: SocketAddr,
    pub broker: Arc<Broker>,
}

impl TestBroker {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

pub async fn spawn_broker(config: BrokerConfig) -> TestBroker {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind ephemeral port");
    };
    serve_on(listener, config)
}

pub fn serve_on(listener: TcpListener, config: BrokerConfig) -> TestBroker {
    let Ok(addr) = listener.local_addr() else {
        panic!("listener address");
    };
    let state = AppState::new(config);
    let broker = Arc::clone(&state.broker);
    let app = build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    TestBroker { addr, broker }
}

pub fn config_with_timeout(timeout: Duration) -> BrokerConfig {
    BrokerConfig {
        execution_timeout: timeout,
        ..BrokerConfig::default()
    }
}

/// Opens a raw socket, optionally with a bearer header.
pub async fn open(url: &str, bearer: Option<&str>) -> Ws {
    let Ok(mut request) = url.into_client_request() else {
        panic!("invalid url {url}");
    };
    if let Some(token) = bearer {
        let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) else {
            panic!("invalid header");
        };
        request.headers_mut().insert("Authorization", value);
    }
    match tokio_tungstenite::connect_async(request).await {
        Ok((ws, _)) => ws,
        Err(err) => panic!("connect {url}: {err}"),
    }
}

/// Opens a socket and consumes the `connected` acknowledgement.
pub async fn join(url: &str) -> Ws {
    let mut ws = open(url, None).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack.get("type"), Some(&Value::from("connected")));
    ws
}

pub async fn send_json(ws: &mut Ws, frame: &Value) {
    if let Err(err) = ws.send(Message::text(frame.to_string())).await {
        panic!("send failed: {err}");
    }
}

/// Next text frame, parsed. Panics after [`WAIT`].
pub async fn recv_json(ws: &mut Ws) -> Value {
    let Some(text) = recv_text(ws).await else {
        panic!("socket closed while waiting for a frame");
    };
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => panic!("invalid frame {text}: {err}"),
    }
}

/// Next text frame as received, or `None` if the socket closed.
pub async fn recv_text(ws: &mut Ws) -> Option<String> {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await {
            Err(_) => panic!("no frame within {WAIT:?}"),
            Ok(Some(Ok(Message::Text(text)))) => return Some(text.to_string()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) => return None,
            Ok(Some(Ok(other))) => panic!("unexpected frame {other:?}"),
        }
    }
}

/// Asserts that nothing arrives within `window`.
pub async fn assert_silent(ws: &mut Ws, window: Duration) {
    if let Ok(Some(Ok(msg))) = tokio::time::timeout(window, ws.next()).await {
        panic!("unexpected frame {msg:?}");
    }
}

/// Polls `check` until it holds or [`WAIT`] elapses.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
