//! Device session registry.
//!
//! Tracks which producer devices are present and when each was last heard
//! from. The registry itself is not synchronized: it is owned by the relay
//! broker and only ever mutated under the broker's lock, which is what keeps
//! register/disconnect races for the same device consistent.

mod session;
#[cfg(test)]
mod tests;

pub use session::*;

use crate::relay::ConnectionId;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// At most one session per device identifier.
///
/// # Examples
///
/// ```
/// use edgewatch::registry::SessionRegistry;
/// use edgewatch::relay::ConnectionId;
/// use std::time::Duration;
///
/// let mut registry = SessionRegistry::new();
/// let conn = ConnectionId::generate();
///
/// let registration = registry.register("cam-1", Some(conn));
/// assert!(registration.superseded.is_none());
/// assert_eq!(registry.list_active(Duration::from_secs(30)).len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, DeviceSession>,
    next_generation: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the session for `device_id`.
    pub fn register(&mut self, device_id: &str, connection: Option<ConnectionId>) -> Registration {
        self.register_at(device_id, connection, Utc::now())
    }

    /// Create or replace the session for `device_id` as of `now`.
    ///
    /// Any previous session for the same device is returned in
    /// [`Registration::superseded`] so the caller can retire its connection.
    pub fn register_at(
        &mut self,
        device_id: &str,
        connection: Option<ConnectionId>,
        now: DateTime<Utc>,
    ) -> Registration {
        self.next_generation += 1;
        let session = DeviceSession::new(
            device_id.to_string(),
            connection,
            self.next_generation,
            now,
        );
        let handle = session.handle();
        let superseded = self.sessions.insert(device_id.to_string(), session);
        Registration { handle, superseded }
    }

    /// Refresh `last_seen`. Unknown devices are a no-op and return `false`.
    pub fn touch(&mut self, device_id: &str) -> bool {
        self.touch_at(device_id, Utc::now())
    }

    pub fn touch_at(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(device_id) {
            Some(session) => {
                session.last_seen = session.last_seen.max(now);
                true
            }
            None => false,
        }
    }

    /// Refresh `last_seen` and `last_frame_at` for a relayed frame.
    pub fn record_frame_at(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(device_id) {
            Some(session) => {
                session.last_seen = session.last_seen.max(now);
                session.last_frame_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Store a telemetry snapshot and refresh `last_seen`.
    pub fn update_telemetry_at(
        &mut self,
        device_id: &str,
        telemetry: Value,
        now: DateTime<Utc>,
    ) -> bool {
        match self.sessions.get_mut(device_id) {
            Some(session) => {
                session.last_seen = session.last_seen.max(now);
                session.telemetry = Some(telemetry);
                true
            }
            None => false,
        }
    }

    /// Remove the session. Removing an absent device is a no-op.
    pub fn remove(&mut self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.remove(device_id)
    }

    /// Remove the session only if it is still bound to `connection`.
    ///
    /// A connection that lost its session to a newer registration must not
    /// tear down the replacement when it finally disconnects.
    pub fn remove_if_bound(
        &mut self,
        device_id: &str,
        connection: &ConnectionId,
    ) -> Option<DeviceSession> {
        if self.sessions.get(device_id)?.is_bound_to(connection) {
            self.sessions.remove(device_id)
        } else {
            None
        }
    }

    /// Whether `handle` still identifies the current session of its device.
    pub fn is_current(&self, handle: &SessionHandle) -> bool {
        self.sessions
            .get(&handle.device_id)
            .is_some_and(|s| s.generation == handle.generation)
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceSession> {
        self.sessions.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.sessions.contains_key(device_id)
    }

    /// Sessions seen within `window`, sorted by device id.
    pub fn list_active(&self, window: Duration) -> Vec<SessionView> {
        self.list_active_at(Utc::now(), window)
    }

    pub fn list_active_at(&self, now: DateTime<Utc>, window: Duration) -> Vec<SessionView> {
        let mut views: Vec<SessionView> = self
            .sessions
            .values()
            .filter(|s| s.is_live_at(now, window))
            .map(|s| SessionView::at(s, now, window))
            .collect();
        views.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        views
    }

    /// Devices whose `last_seen` fell outside `window`.
    pub fn stale_devices_at(&self, now: DateTime<Utc>, window: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .sessions
            .values()
            .filter(|s| !s.is_live_at(now, window))
            .map(|s| s.device_id.clone())
            .collect();
        stale.sort();
        stale
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
