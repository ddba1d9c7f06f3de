//! End-to-end tests for the WebSocket adapter over a real listener.

mod common;

use common::*;
use edgewatch::transport::AppState;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let (app, state) = test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _response) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, message: Value) {
    socket.send(Message::Text(message.to_string())).await.unwrap();
}

/// Next text message as JSON, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Wait until `check` holds, polling the broker.
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn test_producer_and_viewer_over_websocket() {
    let (addr, state) = spawn_server().await;

    let mut producer = connect(addr).await;
    send(&mut producer, json!({"event": "register", "data": {"deviceId": "pi-01"}})).await;
    let ack = next_event(&mut producer).await;
    assert_eq!(ack["event"], "registered");
    assert_eq!(ack["data"]["deviceId"], "pi-01");

    send(
        &mut producer,
        json!({"event": "liveStream", "data": {"deviceId": "pi-01", "frame": "first"}}),
    )
    .await;
    let broker = Arc::clone(&state.broker);
    eventually(|| broker.cached_frame("pi-01").is_some()).await;

    // A late viewer gets the cached frame straight away
    let mut viewer = connect(addr).await;
    send(&mut viewer, json!({"event": "watch", "data": {"deviceId": "pi-01"}})).await;
    let catch_up = next_event(&mut viewer).await;
    assert_eq!(catch_up["event"], "frame-relayed");
    assert_eq!(catch_up["data"]["payload"], "first");

    send(
        &mut producer,
        json!({"event": "frame", "data": {"deviceId": "pi-01", "payload": "second"}}),
    )
    .await;
    let live = next_event(&mut viewer).await;
    assert_eq!(live["event"], "frame-relayed");
    assert_eq!(live["data"]["payload"], "second");

    viewer.send(Message::Text("{not json".into())).await.unwrap();
    let error = next_event(&mut viewer).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "malformed_message");

    producer.close(None).await.unwrap();
    let gone = next_event(&mut viewer).await;
    assert_eq!(gone["event"], "device-disconnected");
    assert_eq!(gone["data"]["deviceId"], "pi-01");
    assert_eq!(gone["data"]["reason"], "disconnected");

    eventually(|| broker.session("pi-01").is_none()).await;
    assert!(broker.cached_frame("pi-01").is_none());
}

#[tokio::test]
async fn test_second_registration_closes_first_socket() {
    let (addr, state) = spawn_server().await;
    let broker = Arc::clone(&state.broker);

    let mut first = connect(addr).await;
    send(&mut first, json!({"event": "registerDevice", "data": "pi-02"})).await;
    assert_eq!(next_event(&mut first).await["event"], "registered");

    let mut second = connect(addr).await;
    send(&mut second, json!({"event": "register", "data": {"deviceId": "pi-02"}})).await;
    assert_eq!(next_event(&mut second).await["event"], "registered");

    assert_eq!(next_event(&mut first).await["event"], "superseded");
    // Then the server closes the socket
    let rest = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = first.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok());

    eventually(|| broker.stats().connections == 1).await;
    let session = broker.session("pi-02").unwrap();
    assert!(session.connection.is_some());
    assert_eq!(broker.stats().producers, 1);
}

#[tokio::test]
async fn test_rejected_message_is_answered_on_the_socket() {
    let (addr, _state) = spawn_server().await;

    let mut producer = connect(addr).await;
    send(
        &mut producer,
        json!({"event": "frame", "data": {"deviceId": "pi-03"}}),
    )
    .await;

    let error = next_event(&mut producer).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "missing_payload");
}
