//! End-to-end relay tests using real WebSocket clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use relay_server::{EchoPolicy, RelayConfig, RelayError, RelayMode, RelayServer, RunningServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);
const WELCOME: &str = r#"{"message":"connection established"}"#;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn config(mode: RelayMode, echo: EchoPolicy) -> ServerConfig {
    ServerConfig {
        port: 0,
        relay: RelayConfig { mode, echo },
        ..ServerConfig::default()
    }
}

/// Boot a server on an ephemeral port.
async fn boot(config: ServerConfig) -> RunningServer {
    RelayServer::new(config).listen().await.unwrap()
}

async fn boot_immediate() -> RunningServer {
    boot(config(RelayMode::Immediate, EchoPolicy::IncludeSender)).await
}

async fn connect(server: &RunningServer, path: &str) -> WsStream {
    let url = format!("ws://{}{path}", server.addr());
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Connect and consume the welcome frame.
async fn join(server: &RunningServer) -> WsStream {
    let mut ws = connect(server, "/").await;
    assert_eq!(next_text(&mut ws).await, WELCOME);
    ws
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        match msg {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within `wait`.
async fn assert_silent(ws: &mut WsStream, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

async fn wait_for_connections(server: &RunningServer, expected: usize) {
    let poll = async {
        loop {
            if server.relay().stats().await.unwrap().connections == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(TIMEOUT, poll).await.expect("connection count never settled");
}

#[tokio::test]
async fn new_connection_gets_welcome_on_both_paths() {
    let server = boot_immediate().await;
    for path in ["/", "/ws"] {
        let mut ws = connect(&server, path).await;
        assert_eq!(next_text(&mut ws).await, WELCOME);
    }
    server.stop().await;
}

#[tokio::test]
async fn welcome_is_not_broadcast_to_existing_clients() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let _b = join(&server).await;
    assert_silent(&mut a, Duration::from_millis(200)).await;
    server.stop().await;
}

#[tokio::test]
async fn immediate_mode_fans_out_to_everyone() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;
    let mut c = join(&server).await;

    let payload = r#"{"head":{"x":0.51,"y":0.12},"hand_left":{"x":0.2,"y":0.66}}"#;
    a.send(Message::text(payload.to_owned())).await.unwrap();

    for ws in [&mut a, &mut b, &mut c] {
        assert_eq!(next_text(ws).await, payload);
    }
    server.stop().await;
}

#[tokio::test]
async fn per_sender_order_is_preserved() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    for i in 0..20 {
        a.send(Message::text(format!(r#"{{"seq":{i}}}"#))).await.unwrap();
    }
    for i in 0..20 {
        let v: Value = serde_json::from_str(&next_text(&mut b).await).unwrap();
        assert_eq!(v["seq"], i);
    }
    server.stop().await;
}

#[tokio::test]
async fn exclude_sender_policy() {
    let server = boot(config(RelayMode::Immediate, EchoPolicy::ExcludeSender)).await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    a.send(Message::text(r#"{"knee":{"x":1,"y":2}}"#.to_owned())).await.unwrap();
    assert_eq!(next_text(&mut b).await, r#"{"knee":{"x":1,"y":2}}"#);
    assert_silent(&mut a, Duration::from_millis(200)).await;
    server.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_closing() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    a.send(Message::text("Hola, servidor!".to_owned())).await.unwrap();
    a.send(Message::text(r#"{"ok":true}"#.to_owned())).await.unwrap();

    // The first thing anyone sees is the valid payload.
    assert_eq!(next_text(&mut b).await, r#"{"ok":true}"#);
    assert_eq!(next_text(&mut a).await, r#"{"ok":true}"#);

    let stats = server.relay().stats().await.unwrap();
    assert_eq!(stats.messages_rejected, 1);
    assert_eq!(stats.connections, 2);
    server.stop().await;
}

#[tokio::test]
async fn utf8_binary_frames_are_relayed_as_text() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    a.send(Message::binary(br#"{"hip":{"x":3,"y":4}}"#.to_vec())).await.unwrap();
    assert_eq!(next_text(&mut b).await, r#"{"hip":{"x":3,"y":4}}"#);
    server.stop().await;
}

#[tokio::test]
async fn debounce_coalesces_a_burst() {
    let server = boot(config(
        RelayMode::Debounced { window_ms: 150 },
        EchoPolicy::IncludeSender,
    ))
    .await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    for i in 1..=3 {
        a.send(Message::text(format!(r#"{{"m":{i}}}"#))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(next_text(&mut b).await, r#"{"m":3}"#);
    assert_eq!(next_text(&mut a).await, r#"{"m":3}"#);
    assert_silent(&mut b, Duration::from_millis(400)).await;

    let stats = server.relay().stats().await.unwrap();
    assert_eq!(stats.broadcasts, 1);
    assert_eq!(stats.superseded, 2);
    server.stop().await;
}

#[tokio::test]
async fn debounce_fires_separately_for_spaced_messages() {
    let server = boot(config(
        RelayMode::Debounced { window_ms: 100 },
        EchoPolicy::IncludeSender,
    ))
    .await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;

    a.send(Message::text(r#"{"m":1}"#.to_owned())).await.unwrap();
    assert_eq!(next_text(&mut b).await, r#"{"m":1}"#);

    tokio::time::sleep(Duration::from_millis(250)).await;
    a.send(Message::text(r#"{"m":2}"#.to_owned())).await.unwrap();
    assert_eq!(next_text(&mut b).await, r#"{"m":2}"#);
    server.stop().await;
}

#[tokio::test]
async fn disconnect_removes_client() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;
    wait_for_connections(&server, 2).await;

    b.close(None).await.unwrap();
    wait_for_connections(&server, 1).await;

    a.send(Message::text("[1,2]".to_owned())).await.unwrap();
    assert_eq!(next_text(&mut a).await, "[1,2]");
    server.stop().await;
}

#[tokio::test]
async fn abrupt_drop_removes_client() {
    let server = boot_immediate().await;
    let _a = join(&server).await;
    let b = join(&server).await;
    wait_for_connections(&server, 2).await;

    drop(b);
    wait_for_connections(&server, 1).await;
    server.stop().await;
}

#[tokio::test]
async fn connection_limit_returns_503() {
    let server = boot(ServerConfig {
        max_connections: 1,
        ..config(RelayMode::Immediate, EchoPolicy::IncludeSender)
    })
    .await;
    let _a = join(&server).await;
    wait_for_connections(&server, 1).await;

    let url = format!("ws://{}/", server.addr());
    match connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 503),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
    server.stop().await;
}

#[tokio::test]
async fn bind_conflict_fails_before_serving() {
    let server = boot_immediate().await;
    let clash = RelayServer::new(ServerConfig {
        port: server.addr().port(),
        ..config(RelayMode::Immediate, EchoPolicy::IncludeSender)
    });
    let err = clash.listen().await.err().expect("bind should fail");
    assert!(matches!(err, RelayError::Bind { .. }));
    server.stop().await;
}

#[tokio::test]
async fn health_endpoint_over_http() {
    let server = boot_immediate().await;
    let _a = join(&server).await;
    wait_for_connections(&server, 1).await;

    let url = format!("http://{}/health", server.addr());
    let body: Value = reqwest::get(url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["pending_broadcast"], false);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let server = boot_immediate().await;
    let mut a = join(&server).await;
    server.stop().await;

    let end = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "client never saw the server go away");
}
