//! WebSocket adapter: the primary channel for producers and viewers.

use super::{message_limit, AppState};
use crate::relay::{ClientMessage, Outbound, RelayError};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

/// Handles WebSocket upgrade requests
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let limit = message_limit(&state.config.relay);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let broker = Arc::clone(&state.broker);
    let (conn, mut outbound) = broker.open_connection();
    let (mut sender, mut receiver) = socket.split();

    // Drain the broker's queue for this connection into the socket
    let send_conn = conn.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Event(event) => match serde_json::to_string(&*event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(connection_id = %send_conn, error = %e, "Failed to serialize relay event");
                    }
                },
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let recv_broker = Arc::clone(&broker);
    let recv_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let decoded = match msg {
                Message::Text(text) => serde_json::from_str::<ClientMessage>(&text),
                Message::Binary(bytes) => serde_json::from_slice::<ClientMessage>(&bytes),
                Message::Close(_) => break,
                // axum answers pings itself
                _ => continue,
            };
            match decoded {
                Ok(message) => {
                    // Rejections are reported back on the socket by the broker
                    let _ = recv_broker.handle_message(&recv_conn, message);
                }
                Err(e) => {
                    recv_broker.reject(&recv_conn, &RelayError::MalformedMessage(e.to_string()));
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broker.on_disconnect(&conn);
}
