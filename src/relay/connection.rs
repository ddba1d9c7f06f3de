//! Connection identity and role.

use super::RelayEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identifier for one transport connection (WebSocket or SSE stream).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a connection is allowed to do.
///
/// A connection starts without a role; its first register, frame, or watch
/// message fixes it for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Producer { device_id: String },
    Viewer,
    /// Producer whose session was replaced by a newer registration or expired
    Stale { device_id: String },
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Producer { .. } => "producer",
            Role::Viewer => "viewer",
            Role::Stale { .. } => "stale producer",
        }
    }
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<RelayEvent>),
    /// Ask the transport to close the connection
    Close,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Buffer full; the event was dropped for this connection only
    Dropped,
    /// Writer task already gone
    Closed,
}

#[derive(Debug)]
pub(crate) struct ConnectionEntry {
    pub role: Option<Role>,
    pub tx: mpsc::Sender<Outbound>,
    pub opened_at: DateTime<Utc>,
}

impl ConnectionEntry {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            role: None,
            tx,
            opened_at: Utc::now(),
        }
    }

    pub fn is_viewer(&self) -> bool {
        matches!(self.role, Some(Role::Viewer))
    }

    pub fn send(&self, event: &Arc<RelayEvent>) -> Delivery {
        self.push(Outbound::Event(Arc::clone(event)))
    }

    pub fn close(&self) -> Delivery {
        self.push(Outbound::Close)
    }

    fn push(&self, item: Outbound) -> Delivery {
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
