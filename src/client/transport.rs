//! WebSocket transport for the bridge client.
//!
//! Thin wrapper around `tokio-tungstenite` that builds the handshake request
//! with extra headers and hands back independent reader/writer halves for
//! use in a `tokio::select!` loop.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Frame received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// UTF-8 text frame.
    Text(String),
    /// Close frame.
    Close {
        /// WebSocket close code (1005 when none was given).
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Write half of the broker socket.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is closed or the write fails.
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(tungstenite::Message::text(text))
            .await
            .context("WebSocket send failed")
    }

    /// Sends a close frame and flushes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of the broker socket.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receives the next text or close frame, returning `None` when the
    /// stream ends. Control and binary frames are skipped; non-UTF-8 binary
    /// frames are dropped.
    pub async fn recv(&mut self) -> Option<Result<Inbound>> {
        loop {
            match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => {
                    return Some(Ok(Inbound::Text(text.to_string())));
                }
                Ok(tungstenite::Message::Binary(data)) => {
                    if let Ok(text) = String::from_utf8(data.to_vec()) {
                        return Some(Ok(Inbound::Text(text)));
                    }
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(Inbound::Close { code, reason }));
                }
                Ok(
                    tungstenite::Message::Ping(_)
                    | tungstenite::Message::Pong(_)
                    | tungstenite::Message::Frame(_),
                ) => {}
                Err(err) => return Some(Err(anyhow::anyhow!("WebSocket read error: {err}"))),
            }
        }
    }
}

/// Connects to `url`, inserting each `(name, value)` header into the
/// handshake request.
///
/// # Errors
///
/// Returns an error if the URL or a header is invalid, or the handshake
/// fails (including an HTTP rejection by the broker).
pub async fn connect(url: &str, headers: &[(&str, String)]) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    for (name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name: {name}"))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .with_context(|| format!("invalid header value for {name}"))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
