use crate::relay::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Liveness status of a device as shown to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// A frame arrived within the liveness window
    Streaming,
    /// Alive (heartbeat or telemetry) but no recent frame
    Idle,
    /// Nothing heard within the liveness window
    Offline,
}

/// Server-side record of one producer device's presence.
///
/// `connection` is `None` for detached sessions created by the HTTP fallback
/// path, which has no persistent connection to bind to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    pub device_id: String,
    pub connection: Option<ConnectionId>,
    /// Increases every time the device (re-)registers
    pub generation: u64,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Last telemetry snapshot, stored verbatim
    pub telemetry: Option<Value>,
}

impl DeviceSession {
    pub(crate) fn new(
        device_id: String,
        connection: Option<ConnectionId>,
        generation: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            connection,
            generation,
            connected_at: now,
            last_seen: now,
            last_frame_at: None,
            telemetry: None,
        }
    }

    /// Whether the session was seen within `window` of `now`.
    ///
    /// A `last_seen` in the future (clock skew between callers) counts as live.
    pub fn is_live_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        within(now, self.last_seen, window)
    }

    /// Whether this session is bound to the given connection.
    pub fn is_bound_to(&self, connection: &ConnectionId) -> bool {
        self.connection.as_ref() == Some(connection)
    }

    pub fn status_at(&self, now: DateTime<Utc>, window: Duration) -> DeviceStatus {
        if !self.is_live_at(now, window) {
            return DeviceStatus::Offline;
        }
        match self.last_frame_at {
            Some(at) if within(now, at, window) => DeviceStatus::Streaming,
            _ => DeviceStatus::Idle,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            device_id: self.device_id.clone(),
            connection: self.connection.clone(),
            generation: self.generation,
        }
    }
}

fn within(now: DateTime<Utc>, then: DateTime<Utc>, window: Duration) -> bool {
    match (now - then).to_std() {
        Ok(age) => age <= window,
        Err(_) => true,
    }
}

/// Identifies one specific registration of a device.
///
/// A handle from an earlier registration stays distinguishable after the
/// device re-registers because its `generation` no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub device_id: String,
    pub connection: Option<ConnectionId>,
    pub generation: u64,
}

/// Result of a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: SessionHandle,
    /// The session this registration replaced, if the device was already present
    pub superseded: Option<DeviceSession>,
}

/// Wire view of an active session, as returned by the active-device query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub device_id: String,
    pub status: DeviceStatus,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame_at: Option<DateTime<Utc>>,
    /// `true` when the device reports over the HTTP fallback path
    #[serde(default)]
    pub detached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
}

impl SessionView {
    pub fn at(session: &DeviceSession, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            device_id: session.device_id.clone(),
            status: session.status_at(now, window),
            connected_at: session.connected_at,
            last_seen: session.last_seen,
            last_frame_at: session.last_frame_at,
            detached: session.connection.is_none(),
            telemetry: session.telemetry.clone(),
        }
    }
}
