//! Relay broker.
//!
//! The broker owns all live-path state: the session registry, the
//! latest-frame cache, viewer subscriptions, and the outbound queue of every
//! open connection. All of it sits behind one mutex, so each operation
//! (register, frame, subscribe, disconnect, expiry) is applied atomically
//! with respect to the others. Operations never await while holding the
//! lock: delivery to connections is a non-blocking `try_send` into a
//! bounded per-connection queue, and a viewer whose queue is full simply
//! misses that event.
//!
//! Transports (WebSocket, SSE, HTTP fallback) are thin adapters: they open a
//! connection with [`RelayBroker::open_connection`], feed decoded
//! [`ClientMessage`]s to [`RelayBroker::handle_message`], drain the
//! returned [`Outbound`] receiver, and call [`RelayBroker::on_disconnect`]
//! when the underlying transport goes away.

mod connection;
mod error;
mod events;
mod subscriptions;
mod tasks;
pub mod types;
mod validation;


pub use connection::{ConnectionId, Outbound, Role};
pub use error::RelayError;
pub use events::*;
pub use subscriptions::SubscriptionTable;
pub use tasks::{DetectionForwarder, LivenessSweeper};
pub use types::{
    BoundingBox, Detection, DetectionReport, FrameEnvelope, FrameSubmission, GeoPoint,
};
pub use validation::{normalize_device_id, validate_frame};

use crate::cache::FrameCache;
use crate::config::RelayConfig;
use crate::persistence::{DetectionPipeline, DetectionRecord};
use crate::registry::{DeviceSession, SessionHandle, SessionRegistry, SessionView};
use chrono::{DateTime, Utc};
use connection::{ConnectionEntry, Delivery};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Counts from one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    /// Viewers whose queue was full
    pub dropped: usize,
}

/// Point-in-time broker counters, exported as gauges.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub sessions: usize,
    pub connections: usize,
    pub producers: usize,
    pub viewers: usize,
    pub cached_frames: usize,
}

/// Where a producer message came from.
#[derive(Debug, Clone, Copy)]
enum Origin<'a> {
    Connection(&'a ConnectionId),
    /// HTTP fallback: no persistent connection, session is created on demand
    Detached,
}

#[derive(Debug, Default)]
struct RelayState {
    registry: SessionRegistry,
    cache: FrameCache,
    subscriptions: SubscriptionTable,
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl RelayState {
    fn role_of(&self, conn: &ConnectionId) -> Result<Option<Role>, RelayError> {
        self.connections
            .get(conn)
            .map(|entry| entry.role.clone())
            .ok_or_else(|| RelayError::UnknownConnection(conn.to_string()))
    }

    fn set_role(&mut self, conn: &ConnectionId, role: Role) {
        if let Some(entry) = self.connections.get_mut(conn) {
            entry.role = Some(role);
        }
    }

    /// Fix `conn` as the producer for `device_id`, or explain why it cannot be.
    fn claim_producer(&mut self, conn: &ConnectionId, device_id: &str) -> Result<(), RelayError> {
        match self.role_of(conn)? {
            None => {
                self.set_role(
                    conn,
                    Role::Producer {
                        device_id: device_id.to_string(),
                    },
                );
                Ok(())
            }
            Some(Role::Producer { device_id: bound }) if bound == device_id => Ok(()),
            Some(Role::Producer { device_id: bound }) => Err(RelayError::DeviceMismatch {
                bound,
                requested: device_id.to_string(),
            }),
            Some(Role::Viewer) => Err(RelayError::RoleMismatch {
                expected: "producer",
                actual: "viewer",
            }),
            Some(Role::Stale { device_id }) => Err(RelayError::StaleConnection(device_id)),
        }
    }

    fn claim_viewer(&mut self, conn: &ConnectionId) -> Result<(), RelayError> {
        match self.role_of(conn)? {
            None => {
                self.set_role(conn, Role::Viewer);
                Ok(())
            }
            Some(Role::Viewer) => Ok(()),
            Some(Role::Producer { .. }) => Err(RelayError::RoleMismatch {
                expected: "viewer",
                actual: "producer",
            }),
            Some(Role::Stale { device_id }) => Err(RelayError::StaleConnection(device_id)),
        }
    }

    /// Create a detached session if the device has none. Returns `true` if created.
    fn ensure_detached_session(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        if self.registry.contains(device_id) {
            return false;
        }
        self.registry.register_at(device_id, None, now);
        tracing::info!(device_id, transport = "http", "Device session opened");
        self.broadcast_to_viewers(&Arc::new(RelayEvent::DeviceConnected(
            DeviceNotice::now(device_id),
        )));
        true
    }

    /// Mark a producer connection stale and ask its transport to close it.
    fn retire(&mut self, conn: &ConnectionId, device_id: &str, notice: Option<RelayEvent>) {
        self.set_role(
            conn,
            Role::Stale {
                device_id: device_id.to_string(),
            },
        );
        if let Some(entry) = self.connections.get(conn) {
            if let Some(event) = notice {
                entry.send(&Arc::new(event));
            }
            entry.close();
        }
    }

    fn send_to(&self, conn: &ConnectionId, event: &Arc<RelayEvent>) -> Delivery {
        match self.connections.get(conn) {
            Some(entry) => entry.send(event),
            None => Delivery::Closed,
        }
    }

    /// Deliver to viewers of `device_id` and viewers of "all", once each.
    fn fan_out(&self, device_id: &str, event: &Arc<RelayEvent>) -> FanOut {
        let mut out = FanOut::default();
        for viewer in self.subscriptions.watchers_of(device_id) {
            tally(&mut out, self.send_to(&viewer, event));
        }
        record_drops(event, out);
        out
    }

    /// Deliver to every viewer connection regardless of subscriptions.
    fn broadcast_to_viewers(&self, event: &Arc<RelayEvent>) -> FanOut {
        let mut out = FanOut::default();
        for entry in self.connections.values().filter(|e| e.is_viewer()) {
            tally(&mut out, entry.send(event));
        }
        record_drops(event, out);
        out
    }

    fn stats(&self) -> RelayStats {
        let producers = self
            .connections
            .values()
            .filter(|e| matches!(e.role, Some(Role::Producer { .. })))
            .count();
        let viewers = self.connections.values().filter(|e| e.is_viewer()).count();
        RelayStats {
            sessions: self.registry.len(),
            connections: self.connections.len(),
            producers,
            viewers,
            cached_frames: self.cache.len(),
        }
    }
}

fn tally(out: &mut FanOut, delivery: Delivery) {
    match delivery {
        Delivery::Queued => out.delivered += 1,
        Delivery::Dropped => out.dropped += 1,
        Delivery::Closed => {}
    }
}

fn record_drops(event: &RelayEvent, out: FanOut) {
    if out.dropped > 0 {
        metrics::counter!("edgewatch_viewer_drops_total", "event" => event.name())
            .increment(out.dropped as u64);
        tracing::debug!(
            event = event.name(),
            dropped = out.dropped,
            "Viewer queue full, event dropped"
        );
    }
}

/// The live-path coordinator shared by all transports.
///
/// # Examples
///
/// ```
/// use edgewatch::config::RelayConfig;
/// use edgewatch::relay::{FrameSubmission, Outbound, RelayBroker, RelayEvent, WatchTarget};
///
/// let broker = RelayBroker::new(RelayConfig::default(), None);
///
/// let (producer, _producer_rx) = broker.open_connection();
/// broker.on_register(&producer, "cam-1").unwrap();
///
/// let (viewer, mut viewer_rx) = broker.open_connection();
/// broker.on_subscribe(&viewer, WatchTarget::All).unwrap();
///
/// broker
///     .on_frame(&producer, FrameSubmission::new("cam-1", "aGVsbG8="))
///     .unwrap();
///
/// match viewer_rx.try_recv().unwrap() {
///     Outbound::Event(event) => assert!(matches!(*event, RelayEvent::FrameRelayed(_))),
///     Outbound::Close => unreachable!(),
/// }
/// ```
pub struct RelayBroker {
    state: Mutex<RelayState>,
    config: RelayConfig,
    pipeline: Option<Arc<DetectionPipeline>>,
}

impl RelayBroker {
    /// Create a broker. Without a pipeline, detections are relayed but not persisted.
    pub fn new(config: RelayConfig, pipeline: Option<Arc<DetectionPipeline>>) -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            config,
            pipeline,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Option<&Arc<DetectionPipeline>> {
        self.pipeline.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        // Every mutation leaves the state consistent, so a panic elsewhere
        // does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a connection with no role yet.
    ///
    /// The receiver yields everything the broker wants written to this
    /// connection; it is bounded by `viewer_buffer`.
    pub fn open_connection(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.config.viewer_buffer.max(1));
        let id = ConnectionId::generate();
        self.lock()
            .connections
            .insert(id.clone(), ConnectionEntry::new(tx));
        tracing::debug!(connection_id = %id, "Connection opened");
        (id, rx)
    }

    /// Route one decoded message from `conn`.
    ///
    /// On error, an `error` event is also queued back to `conn`.
    pub fn handle_message(&self, conn: &ConnectionId, message: ClientMessage) -> Result<(), RelayError> {
        let result = match message {
            ClientMessage::Register(device) => self.on_register(conn, device.device_id()).map(|_| ()),
            ClientMessage::Frame(submission) => self.on_frame(conn, submission).map(|_| ()),
            ClientMessage::Telemetry(report) => self.on_telemetry(conn, report).map(|_| ()),
            ClientMessage::Heartbeat(device) => self.on_heartbeat(conn, device.device_id()).map(|_| ()),
            ClientMessage::Watch(request) => self.on_subscribe(conn, request.target()).map(|_| ()),
            ClientMessage::Unwatch(request) => {
                self.on_unsubscribe(conn, &request.target()).map(|_| ())
            }
            ClientMessage::ListActiveDevices => {
                let event = Arc::new(RelayEvent::ActiveDevices(self.list_active_devices()));
                self.lock().send_to(conn, &event);
                Ok(())
            }
        };
        if let Err(ref err) = result {
            self.reject(conn, err);
        }
        result
    }

    /// Queue an `error` event for `conn`.
    pub fn reject(&self, conn: &ConnectionId, err: &RelayError) {
        tracing::warn!(connection_id = %conn, code = err.code(), error = %err, "Message rejected");
        let event = Arc::new(RelayEvent::Error(ErrorNotice::from(err)));
        self.lock().send_to(conn, &event);
    }

    /// Register `conn` as the producer for `device_id`.
    ///
    /// Any previous session for the device is superseded: its connection is
    /// marked stale, told so, and closed. Its eventual disconnect will not
    /// tear down the new session.
    pub fn on_register(&self, conn: &ConnectionId, device_id: &str) -> Result<SessionHandle, RelayError> {
        let device_id = normalize_device_id(Some(device_id))?;
        let mut state = self.lock();
        state.claim_producer(conn, &device_id)?;

        let registration = state
            .registry
            .register_at(&device_id, Some(conn.clone()), Utc::now());
        let reregistered = registration
            .superseded
            .as_ref()
            .is_some_and(|old| old.is_bound_to(conn));

        if let Some(old_conn) = registration
            .superseded
            .as_ref()
            .and_then(|old| old.connection.as_ref())
            .filter(|old_conn| *old_conn != conn)
        {
            tracing::info!(
                device_id = %device_id,
                previous_connection = %old_conn,
                connection_id = %conn,
                "Device re-registered, closing previous connection"
            );
            state.retire(
                old_conn,
                &device_id,
                Some(RelayEvent::Superseded(DeviceNotice::now(&device_id))),
            );
        }

        let notice = DeviceNotice::now(&device_id);
        state.send_to(conn, &Arc::new(RelayEvent::Registered(notice.clone())));
        if !reregistered {
            tracing::info!(device_id = %device_id, connection_id = %conn, "Device registered");
            state.broadcast_to_viewers(&Arc::new(RelayEvent::DeviceConnected(notice)));
        }
        Ok(registration.handle)
    }

    /// Accept a frame from a producer connection.
    pub fn on_frame(
        &self,
        conn: &ConnectionId,
        submission: FrameSubmission,
    ) -> Result<Arc<FrameEnvelope>, RelayError> {
        self.submit_frame(Origin::Connection(conn), submission)
    }

    /// Accept a frame from the HTTP fallback path.
    ///
    /// Creates a detached session for the device if it has none.
    pub fn on_detached_frame(&self, submission: FrameSubmission) -> Result<Arc<FrameEnvelope>, RelayError> {
        self.submit_frame(Origin::Detached, submission)
    }

    fn submit_frame(
        &self,
        origin: Origin<'_>,
        submission: FrameSubmission,
    ) -> Result<Arc<FrameEnvelope>, RelayError> {
        let now = Utc::now();
        let envelope = match validate_frame(submission, self.config.max_payload_bytes, now) {
            Ok(envelope) => Arc::new(envelope),
            Err(err) => {
                metrics::counter!("edgewatch_frames_rejected_total", "reason" => err.code())
                    .increment(1);
                tracing::warn!(code = err.code(), error = %err, "Frame rejected");
                return Err(err);
            }
        };
        let device_id = envelope.device_id.as_str();

        let out = {
            let mut state = self.lock();
            match origin {
                Origin::Connection(conn) => state.claim_producer(conn, device_id)?,
                Origin::Detached => {
                    state.ensure_detached_session(device_id, now);
                }
            }
            state.cache.put(Arc::clone(&envelope));
            state.registry.record_frame_at(device_id, now);
            state.fan_out(
                device_id,
                &Arc::new(RelayEvent::FrameRelayed(Arc::clone(&envelope))),
            )
        };

        metrics::counter!("edgewatch_frames_relayed_total").increment(1);
        metrics::histogram!("edgewatch_frame_payload_bytes").record(envelope.payload_len() as f64);
        tracing::trace!(
            device_id,
            payload = %crate::logging::payload_size_label(envelope.payload_len()),
            detections = envelope.detections.len(),
            viewers = out.delivered,
            "Frame relayed"
        );

        if let Some(pipeline) = &self.pipeline {
            pipeline.ingest(&envelope);
        }
        Ok(envelope)
    }

    /// Store a telemetry snapshot from a producer connection.
    ///
    /// Returns `false` if the device has no session (the report is ignored).
    pub fn on_telemetry(&self, conn: &ConnectionId, report: TelemetryReport) -> Result<bool, RelayError> {
        self.submit_telemetry(Origin::Connection(conn), report)
    }

    /// Store a telemetry snapshot from the HTTP fallback path.
    pub fn on_detached_telemetry(&self, report: TelemetryReport) -> Result<bool, RelayError> {
        self.submit_telemetry(Origin::Detached, report)
    }

    fn submit_telemetry(&self, origin: Origin<'_>, report: TelemetryReport) -> Result<bool, RelayError> {
        let device_id = normalize_device_id(report.device_id.as_deref())?;
        let now = Utc::now();
        let mut state = self.lock();
        match origin {
            Origin::Connection(conn) => state.claim_producer(conn, &device_id)?,
            Origin::Detached => {
                state.ensure_detached_session(&device_id, now);
            }
        }

        let Some(snapshot) = report.snapshot() else {
            return Ok(state.registry.touch_at(&device_id, now));
        };
        if !state.registry.update_telemetry_at(&device_id, snapshot.clone(), now) {
            tracing::debug!(device_id = %device_id, "Telemetry for unknown device ignored");
            return Ok(false);
        }
        state.fan_out(
            &device_id,
            &Arc::new(RelayEvent::DeviceStatus(StatusNotice {
                device_id: device_id.clone(),
                telemetry: snapshot,
                timestamp: now,
            })),
        );
        Ok(true)
    }

    /// Refresh liveness for a producer connection's device.
    pub fn on_heartbeat(&self, conn: &ConnectionId, device_id: &str) -> Result<bool, RelayError> {
        let device_id = normalize_device_id(Some(device_id))?;
        let mut state = self.lock();
        state.claim_producer(conn, &device_id)?;
        Ok(state.registry.touch_at(&device_id, Utc::now()))
    }

    /// Refresh liveness from the HTTP fallback path.
    pub fn on_detached_heartbeat(&self, device_id: &str) -> Result<DeviceSession, RelayError> {
        let device_id = normalize_device_id(Some(device_id))?;
        let now = Utc::now();
        let mut state = self.lock();
        state.ensure_detached_session(&device_id, now);
        state.registry.touch_at(&device_id, now);
        state
            .registry
            .get(&device_id)
            .cloned()
            .ok_or(RelayError::MissingDeviceId)
    }

    /// Subscribe a viewer. Returns how many cached frames were sent as catch-up.
    ///
    /// Watching a specific device replays its latest cached frame; watching
    /// "all" replays the latest frame of every device that has one.
    pub fn on_subscribe(&self, viewer: &ConnectionId, target: WatchTarget) -> Result<usize, RelayError> {
        let mut state = self.lock();
        state.claim_viewer(viewer)?;

        let catch_up: Vec<Arc<FrameEnvelope>> = match &target {
            WatchTarget::Device(device_id) => state.cache.get(device_id).into_iter().collect(),
            WatchTarget::All => state.cache.all(),
        };
        state.subscriptions.subscribe(viewer, target.clone());

        let mut sent = 0;
        for frame in catch_up {
            if state.send_to(viewer, &Arc::new(RelayEvent::FrameRelayed(frame))) == Delivery::Queued {
                sent += 1;
            }
        }
        tracing::debug!(connection_id = %viewer, target = %target, catch_up = sent, "Viewer subscribed");
        Ok(sent)
    }

    /// Remove one subscription. Returns `false` if the viewer did not hold it.
    pub fn on_unsubscribe(&self, viewer: &ConnectionId, target: &WatchTarget) -> Result<bool, RelayError> {
        let mut state = self.lock();
        match state.role_of(viewer)? {
            Some(Role::Viewer) => Ok(state.subscriptions.unsubscribe(viewer, target)),
            None => Ok(false),
            Some(Role::Stale { device_id }) => Err(RelayError::StaleConnection(device_id)),
            Some(Role::Producer { .. }) => Err(RelayError::RoleMismatch {
                expected: "viewer",
                actual: "producer",
            }),
        }
    }

    /// Devices seen within the liveness window, sorted by id.
    pub fn list_active_devices(&self) -> Vec<SessionView> {
        self.list_active_devices_at(Utc::now())
    }

    pub fn list_active_devices_at(&self, now: DateTime<Utc>) -> Vec<SessionView> {
        self.lock()
            .registry
            .list_active_at(now, self.config.liveness_window())
    }

    /// Tear down everything owned by `conn`.
    ///
    /// A producer's session is removed only if it is still bound to this
    /// connection; a superseded connection leaves the newer session alone.
    /// Returns the device id whose session was removed, if any. Calling it
    /// again for the same connection is a no-op.
    pub fn on_disconnect(&self, conn: &ConnectionId) -> Option<String> {
        let mut state = self.lock();
        let entry = state.connections.remove(conn)?;
        let lifetime_secs = (Utc::now() - entry.opened_at).num_seconds();

        match entry.role {
            Some(Role::Producer { device_id }) => {
                let removed = state.registry.remove_if_bound(&device_id, conn);
                if !state.registry.contains(&device_id) {
                    state.cache.evict(&device_id);
                }
                removed.map(|_| {
                    tracing::info!(
                        device_id = %device_id,
                        connection_id = %conn,
                        lifetime_secs,
                        "Device disconnected"
                    );
                    state.broadcast_to_viewers(&Arc::new(RelayEvent::DeviceDisconnected(
                        DeviceNotice::now(&device_id).with_reason(DisconnectReason::Disconnected),
                    )));
                    device_id
                })
            }
            Some(Role::Viewer) => {
                let removed = state.subscriptions.remove_viewer(conn);
                tracing::debug!(connection_id = %conn, subscriptions = removed, lifetime_secs, "Viewer disconnected");
                None
            }
            Some(Role::Stale { .. }) | None => {
                tracing::debug!(connection_id = %conn, lifetime_secs, "Connection closed");
                None
            }
        }
    }

    /// Remove sessions silent for longer than the liveness window.
    pub fn expire_stale(&self) -> Vec<String> {
        self.expire_stale_at(Utc::now())
    }

    /// Remove sessions silent for longer than the liveness window as of `now`.
    ///
    /// Their cached frames are evicted, their producer connections (if any)
    /// are closed, and viewers are told the device is gone.
    pub fn expire_stale_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.lock();
        let stale = state
            .registry
            .stale_devices_at(now, self.config.liveness_window());

        for device_id in &stale {
            let Some(session) = state.registry.remove(device_id) else {
                continue;
            };
            state.cache.evict(device_id);
            if let Some(conn) = &session.connection {
                state.retire(conn, device_id, None);
            }
            tracing::info!(
                device_id = %device_id,
                last_seen = %session.last_seen,
                "Device session expired"
            );
            state.broadcast_to_viewers(&Arc::new(RelayEvent::DeviceDisconnected(
                DeviceNotice::now(device_id).with_reason(DisconnectReason::Expired),
            )));
        }
        stale
    }

    /// Forward a stored detection to viewers of its device.
    pub fn on_detection_recorded(&self, record: Arc<DetectionRecord>) -> FanOut {
        let state = self.lock();
        let device_id = record.device_id.clone();
        state.fan_out(&device_id, &Arc::new(RelayEvent::DetectionRecorded(record)))
    }

    /// Ask every open connection to close. Returns how many were asked.
    ///
    /// Viewers are told about each connected producer first, with reason
    /// `shutdown`, so they can tell a restart from a device going dark.
    pub fn shutdown(&self) -> usize {
        let state = self.lock();
        let producing: Vec<String> = state
            .connections
            .values()
            .filter_map(|entry| match &entry.role {
                Some(Role::Producer { device_id }) => Some(device_id.clone()),
                _ => None,
            })
            .collect();
        for device_id in &producing {
            state.broadcast_to_viewers(&Arc::new(RelayEvent::DeviceDisconnected(
                DeviceNotice::now(device_id).with_reason(DisconnectReason::Shutdown),
            )));
        }
        for entry in state.connections.values() {
            entry.close();
        }
        tracing::info!(
            connections = state.connections.len(),
            producers = producing.len(),
            "Relay shutting down"
        );
        state.connections.len()
    }

    pub fn cached_frame(&self, device_id: &str) -> Option<Arc<FrameEnvelope>> {
        self.lock().cache.get(device_id)
    }

    pub fn session(&self, device_id: &str) -> Option<DeviceSession> {
        self.lock().registry.get(device_id).cloned()
    }

    pub fn role(&self, conn: &ConnectionId) -> Option<Role> {
        self.lock().role_of(conn).ok().flatten()
    }

    pub fn subscriptions_of(&self, viewer: &ConnectionId) -> Vec<WatchTarget> {
        self.lock().subscriptions.targets_of(viewer)
    }

    pub fn stats(&self) -> RelayStats {
        self.lock().stats()
    }
}
