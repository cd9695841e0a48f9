//! Bridge client against a live broker.

#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use assist_bridge::client::{BridgeClient, ConnectionState};
use assist_bridge::config::{BrokerConfig, ClientConfig};
use assist_bridge::domain::{
    CommandRegistry, ErrorReport, EventBus, EventKind, LogLevel, LogRecord,
    register_builtin_commands,
};
use common::{WAIT, eventually, join, recv_json, send_json, serve_on, spawn_broker};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_test::assert_ok;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Server side of a socket accepted by a bare listener standing in for the
/// broker, so tests can observe exactly what the client sends.
type ServerWs = WebSocketStream<TcpStream>;

fn app() -> (EventBus, CommandRegistry) {
    let bus = EventBus::default();
    let registry = CommandRegistry::new(bus.clone());
    register_builtin_commands(&registry);
    registry.register_sync("addTodo", "Add a todo item", |payload| {
        match payload.as_ref().and_then(Value::as_str) {
            Some(_) => Ok(json!("Added")),
            None => anyhow::bail!("addTodo expects a string"),
        }
    });
    (bus, registry)
}

fn client_config(url: String) -> ClientConfig {
    ClientConfig {
        url_override: Some(url),
        reconnect_delay: Duration::from_millis(100),
        context_throttle: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

async fn bare_listener() -> (TcpListener, String) {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind ephemeral port");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener address");
    };
    (listener, format!("ws://{addr}/ws"))
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let Ok(Ok((stream, _))) = tokio::time::timeout(WAIT, listener.accept()).await else {
        panic!("no client connection within {WAIT:?}");
    };
    match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => panic!("handshake failed: {err}"),
    }
}

/// Next text frame within `within`, or `None` on silence or close.
async fn next_frame(ws: &mut ServerWs, within: Duration) -> Option<Value> {
    loop {
        match tokio::time::timeout(within, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str(text.as_str()) {
                Ok(value) => return Some(value),
                Err(err) => panic!("invalid frame {text}: {err}"),
            },
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            _ => return None,
        }
    }
}

async fn expect_frame(ws: &mut ServerWs, kind: &str) -> Value {
    let Some(frame) = next_frame(ws, WAIT).await else {
        panic!("expected a {kind} frame");
    };
    assert_eq!(frame.get("type"), Some(&json!(kind)), "frame: {frame}");
    frame
}

async fn open_client(client: &BridgeClient) {
    let opened = assert_ok!(tokio::time::timeout(WAIT, client.wait_for(ConnectionState::Open)).await);
    assert_ok!(opened);
}

#[tokio::test]
async fn pushes_context_and_commands_on_open() {
    let server = spawn_broker(BrokerConfig::default()).await;
    let (bus, registry) = app();
    bus.emit(
        EventKind::Log,
        LogRecord {
            level: LogLevel::Info,
            args: vec!["booted".to_string()],
        },
    );

    let client = BridgeClient::start(bus, registry, client_config(server.ws_url()));
    open_client(&client).await;
    eventually("commands announced", || {
        server.broker.commands().as_array().map(Vec::len) == Some(2)
    })
    .await;

    let commands = server.broker.commands();
    let names: Vec<&str> = commands
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["clearLogs", "addTodo"]);
    assert_eq!(server.broker.app_peer_count(), 1);
    let context = server.broker.latest_context();
    assert_eq!(context.pointer("/logs/0/data/args/0"), Some(&json!("booted")));

    client.shutdown().await;
}

#[tokio::test]
async fn controller_executes_registered_command() {
    let server = spawn_broker(BrokerConfig::default()).await;
    let (bus, registry) = app();
    let client = BridgeClient::start(bus.clone(), registry, client_config(server.ws_url()));
    eventually("app registered", || server.broker.app_peer_count() == 1).await;

    let mut ctl = join(&server.ws_url()).await;
    send_json(
        &mut ctl,
        &json!({"v": 1, "type": "execute", "command": "addTodo", "payload": "Buy Milk", "requestId": "r1"}),
    )
    .await;

    let reply = loop {
        let frame = recv_json(&mut ctl).await;
        if frame.get("type") == Some(&json!("executeResult")) {
            break frame;
        }
    };
    assert_eq!(reply.get("requestId"), Some(&json!("r1")));
    assert_eq!(reply.get("result"), Some(&json!({"success": true, "result": "Added"})));

    let recorded = bus.buffer().into_iter().any(|e| e.kind == EventKind::Command);
    assert!(recorded, "execution must be recorded on the bus");

    client.shutdown().await;
}

#[tokio::test]
async fn failing_and_unknown_commands_report_errors() {
    let server = spawn_broker(BrokerConfig::default()).await;
    let (bus, registry) = app();
    let client = BridgeClient::start(bus, registry, client_config(server.ws_url()));
    eventually("app registered", || server.broker.app_peer_count() == 1).await;

    let mut ctl = join(&server.ws_url()).await;
    send_json(
        &mut ctl,
        &json!({"type": "execute", "command": "addTodo", "payload": 42, "requestId": "bad"}),
    )
    .await;
    send_json(
        &mut ctl,
        &json!({"type": "execute", "command": "nope", "requestId": "unknown"}),
    )
    .await;

    let mut results = Vec::new();
    while results.len() < 2 {
        let frame = recv_json(&mut ctl).await;
        if frame.get("type") == Some(&json!("executeResult")) {
            results.push(frame);
        }
    }
    let by_id = |id: &str| {
        results
            .iter()
            .find(|r| r.get("requestId") == Some(&json!(id)))
            .and_then(|r| r.get("result").cloned())
    };
    assert_eq!(
        by_id("bad"),
        Some(json!({"success": false, "error": "addTodo expects a string"}))
    );
    assert_eq!(
        by_id("unknown"),
        Some(json!({"success": false, "error": "Unknown command: nope"}))
    );

    client.shutdown().await;
}

#[tokio::test]
async fn bus_events_stream_to_controllers() {
    let server = spawn_broker(BrokerConfig::default()).await;
    let (bus, registry) = app();
    let client = BridgeClient::start(bus.clone(), registry, client_config(server.ws_url()));
    eventually("app registered", || server.broker.app_peer_count() == 1).await;
    let mut ctl = join(&server.ws_url()).await;
    eventually("controller registered", || server.broker.peer_count() == 2).await;

    let emitted = bus.emit(
        EventKind::Error,
        ErrorReport {
            message: "render failed".to_string(),
            filename: Some("todo_list.rs".to_string()),
            lineno: Some(42),
            colno: None,
            stack: None,
        },
    );

    let frame = recv_json(&mut ctl).await;
    assert_eq!(frame.get("type"), Some(&json!("event")));
    assert_eq!(frame.pointer("/data/id"), Some(&json!(emitted.id.as_str())));
    assert_eq!(frame.pointer("/data/type"), Some(&json!("error")));
    assert_eq!(frame.pointer("/data/data/message"), Some(&json!("render failed")));

    // Trailing context resync picks up the error.
    eventually("context resync", || {
        server
            .broker
            .latest_context()
            .pointer("/lastError/data/message")
            == Some(&json!("render failed"))
    })
    .await;

    client.shutdown().await;
}

#[tokio::test]
async fn reconnects_once_broker_becomes_reachable() {
    let Ok(reserved) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind ephemeral port");
    };
    let Ok(addr) = reserved.local_addr() else {
        panic!("reserved address");
    };
    drop(reserved);

    let (bus, registry) = app();
    let client = BridgeClient::start(bus, registry, client_config(format!("ws://{addr}/ws")));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_ne!(client.state(), ConnectionState::Open);

    let Ok(listener) = TcpListener::bind(addr).await else {
        panic!("rebind {addr}");
    };
    let server = serve_on(listener, BrokerConfig::default());

    open_client(&client).await;
    eventually("app registered", || server.broker.app_peer_count() == 1).await;

    client.shutdown().await;
    eventually("peer removed", || server.broker.peer_count() == 0).await;
}

#[tokio::test]
async fn rejected_token_never_registers_the_app() {
    let server = spawn_broker(BrokerConfig {
        token: Some("secret-123".to_string()),
        ..BrokerConfig::default()
    })
    .await;

    let (bus, registry) = app();
    let client = BridgeClient::start(
        bus.clone(),
        registry.clone(),
        client_config(server.ws_url()),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.broker.app_peer_count(), 0);
    client.shutdown().await;

    let mut config = client_config(server.ws_url());
    config.token = Some("secret-123".to_string());
    let client = BridgeClient::start(bus, registry, config);
    eventually("app registered", || server.broker.app_peer_count() == 1).await;
    client.shutdown().await;
}

#[tokio::test]
async fn burst_of_events_yields_one_context_resync() {
    let (listener, url) = bare_listener().await;
    let (bus, registry) = app();
    let mut config = client_config(url);
    config.context_throttle = Duration::from_millis(300);
    let client = BridgeClient::start(bus.clone(), registry, config);

    let mut ws = accept(&listener).await;
    expect_frame(&mut ws, "context").await;
    expect_frame(&mut ws, "commands").await;

    for i in 0..20 {
        bus.emit(
            EventKind::Log,
            LogRecord {
                level: LogLevel::Info,
                args: vec![format!("line {i}")],
            },
        );
    }

    let mut events = 0;
    let mut contexts = Vec::new();
    while let Some(frame) = next_frame(&mut ws, Duration::from_millis(800)).await {
        match frame.get("type").and_then(Value::as_str) {
            Some("event") => events += 1,
            Some("context") => contexts.push(frame),
            other => panic!("unexpected frame type {other:?}"),
        }
    }

    assert_eq!(events, 20);
    assert_eq!(contexts.len(), 1, "one resync per throttle window");
    let logs = contexts
        .first()
        .and_then(|c| c.pointer("/data/logs"))
        .and_then(Value::as_array)
        .map(Vec::len);
    assert_eq!(logs, Some(20));

    client.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_broker_closes_the_socket() {
    let (listener, url) = bare_listener().await;
    let (bus, registry) = app();
    let client = BridgeClient::start(bus, registry, client_config(url));

    let mut ws = accept(&listener).await;
    expect_frame(&mut ws, "context").await;
    expect_frame(&mut ws, "commands").await;
    assert_ok!(ws.close(None).await);

    let mut again = accept(&listener).await;
    expect_frame(&mut again, "context").await;
    expect_frame(&mut again, "commands").await;
    assert_eq!(client.state(), ConnectionState::Open);

    client.shutdown().await;
}
