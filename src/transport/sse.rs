//! Server-sent event stream for viewers behind proxies that block WebSockets.

use super::{ApiError, AppState};
use crate::relay::{ConnectionId, Outbound, RelayBroker, RelayEvent, WatchTarget};
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Device to watch; absent means every device
    #[serde(rename = "deviceId", alias = "device_id")]
    pub device_id: Option<String>,
}

/// GET /api/live/events
///
/// The stream carries the same events as a WebSocket viewer receives,
/// with the event name in the SSE `event:` field and the payload as `data:`.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let broker = Arc::clone(&state.broker);
    let (conn, outbound) = broker.open_connection();
    let guard = DisconnectGuard {
        broker: Arc::clone(&broker),
        conn,
    };

    let target = WatchTarget::from(query.device_id);
    broker.on_subscribe(&guard.conn, target.clone())?;
    tracing::debug!(connection_id = %guard.conn, watch = %target, "Event stream opened");

    Ok(Sse::new(viewer_stream(guard, outbound)).keep_alive(KeepAlive::default()))
}

/// Render a relay event as an SSE event.
pub fn to_sse_event(event: &RelayEvent) -> Result<Event, serde_json::Error> {
    Ok(Event::default()
        .event(event.name())
        .data(event.data()?.to_string()))
}

/// Disconnects the viewer when the stream is dropped.
struct DisconnectGuard {
    broker: Arc<RelayBroker>,
    conn: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.broker.on_disconnect(&self.conn);
    }
}

fn viewer_stream(
    guard: DisconnectGuard,
    mut outbound: mpsc::Receiver<Outbound>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let guard = guard;
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Event(event) => match to_sse_event(&event) {
                    Ok(sse) => yield Ok(sse),
                    Err(e) => tracing::error!(
                        connection_id = %guard.conn,
                        error = %e,
                        "Failed to serialize relay event"
                    ),
                },
                Outbound::Close => break,
            }
        }
    }
}
