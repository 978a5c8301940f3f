//! End-to-end WebSocket tests against a server on an ephemeral port.

mod helpers;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use helpers::TestApp;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, TestApp) {
    let app = TestApp::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, app)
}

async fn connect(addr: SocketAddr, identity: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?identity={identity}"))
        .await
        .unwrap();
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Read frames until one of the given `type` arrives.
async fn next_of_kind(ws: &mut Client, kind: &str) -> Value {
    let wait = async {
        while let Some(frame) = ws.next().await {
            let frame = frame.unwrap();
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
        panic!("socket closed before a {kind} frame arrived");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}

#[tokio::test]
async fn test_ws_upgrade_with_malformed_identity_is_rejected() {
    let (addr, _app) = spawn_server().await;

    let err = connect_async(format!("ws://{addr}/ws?identity=bad-name"))
        .await
        .unwrap_err();

    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 400);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_connect_announces_and_verifies_online() {
    let (addr, app) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;

    let online = next_of_kind(&mut alice, "presence_online").await;
    assert_eq!(online["identity"], "alice");

    send(&mut alice, json!({ "type": "verify", "identity": "alice" })).await;
    let status = next_of_kind(&mut alice, "presence_status").await;
    assert_eq!(status["identity"], "alice");
    assert_eq!(status["online"], true);

    send(&mut alice, json!({ "type": "verify", "identity": "nobody" })).await;
    let missing = next_of_kind(&mut alice, "identity_not_found").await;
    assert_eq!(missing["identity"], "nobody");

    assert_eq!(app.state.connections.connection_count(), 1);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    let (addr, app) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    next_of_kind(&mut alice, "presence_online").await;

    alice
        .send(Message::text("{\"type\":\"teleport\"}"))
        .await
        .unwrap();
    let error = next_of_kind(&mut alice, "error").await;
    assert_eq!(error["code"], "INVALID_MESSAGE");
    assert_eq!(app.state.engine.metrics().events_rejected, 1);
}

#[tokio::test]
async fn test_close_frame_takes_identity_offline_for_peers() {
    let (addr, _app) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    next_of_kind(&mut alice, "presence_online").await;

    let mut bob = connect(addr, "bob").await;
    let seen = next_of_kind(&mut alice, "presence_online").await;
    assert_eq!(seen["identity"], "bob");

    alice.close(None).await.unwrap();

    let offline = next_of_kind(&mut bob, "presence_offline").await;
    assert_eq!(offline["identity"], "alice");
}

#[tokio::test]
async fn test_event_is_relayed_between_sockets() {
    let (addr, _app) = spawn_server().await;
    let mut alice = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;
    next_of_kind(&mut bob, "presence_online").await;

    send(
        &mut alice,
        json!({
            "type": "send",
            "event_type": "nudge",
            "to": "bob",
            "payload": { "text": "hi" }
        }),
    )
    .await;

    let accepted = next_of_kind(&mut alice, "event_accepted").await;
    assert_eq!(accepted["event_type"], "nudge");

    let relayed = next_of_kind(&mut bob, "relayed_event").await;
    assert_eq!(relayed["from"], "alice");
    assert_eq!(relayed["payload"]["text"], "hi");
}
