//! Message envelopes exchanged over the bidirectional transport.
//!
//! Both directions use the same adjacently tagged shape:
//!
//! ```json
//! {"event": "frame", "data": {"deviceId": "pi-01", "payload": "..."}}
//! ```
//!
//! Inbound event names also accept the camelCase names used by the existing
//! Raspberry Pi producers (`registerDevice`, `liveStream`, `deviceStatusUpdate`).

use super::types::{FrameEnvelope, FrameSubmission};
use crate::persistence::DetectionRecord;
use crate::registry::SessionView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A message sent by a producer or viewer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(alias = "registerDevice")]
    Register(DeviceRef),
    #[serde(alias = "liveStream", alias = "stream")]
    Frame(FrameSubmission),
    #[serde(alias = "deviceStatusUpdate")]
    Telemetry(TelemetryReport),
    Heartbeat(DeviceRef),
    Watch(WatchRequest),
    Unwatch(WatchRequest),
    #[serde(alias = "listActiveDevices")]
    ListActiveDevices,
}

/// A device identifier, given bare or as `{"deviceId": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceRef {
    Bare(String),
    Object {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
}

impl DeviceRef {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceRef::Bare(id) => id,
            DeviceRef::Object { device_id } => device_id,
        }
    }
}

/// Which devices a viewer wants frames from.
///
/// An empty id, `*` or `all` (any case) mean every device. Producers cannot
/// register under those names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WatchTarget {
    All,
    Device(String),
}

impl From<String> for WatchTarget {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("all") {
            WatchTarget::All
        } else {
            WatchTarget::Device(trimmed.to_string())
        }
    }
}

impl From<&str> for WatchTarget {
    fn from(value: &str) -> Self {
        WatchTarget::from(value.to_string())
    }
}

impl From<WatchTarget> for String {
    fn from(target: WatchTarget) -> Self {
        match target {
            WatchTarget::All => "all".to_string(),
            WatchTarget::Device(id) => id,
        }
    }
}

impl From<Option<String>> for WatchTarget {
    fn from(value: Option<String>) -> Self {
        value.map(WatchTarget::from).unwrap_or(WatchTarget::All)
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::All => f.write_str("all"),
            WatchTarget::Device(id) => f.write_str(id),
        }
    }
}

/// Body of a watch/unwatch message. A missing device id means "all".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WatchRequest {
    Bare(WatchTarget),
    Object {
        #[serde(rename = "deviceId", default)]
        device_id: Option<String>,
    },
}

impl WatchRequest {
    pub fn target(&self) -> WatchTarget {
        match self {
            WatchRequest::Bare(target) => target.clone(),
            WatchRequest::Object { device_id } => WatchTarget::from(device_id.clone()),
        }
    }
}

/// Telemetry from a producer.
///
/// Accepts either `{"deviceId", "telemetry": {...}}` or the flat shape the
/// reference producers send, where every other field is the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetryReport {
    #[serde(rename = "deviceId", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub telemetry: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryReport {
    pub fn new(device_id: impl Into<String>, telemetry: Value) -> Self {
        Self {
            device_id: Some(device_id.into()),
            telemetry: Some(telemetry),
            extra: Map::new(),
        }
    }

    /// The snapshot to store. `None` when the report carried nothing.
    pub fn snapshot(&self) -> Option<Value> {
        if let Some(telemetry) = &self.telemetry {
            return Some(telemetry.clone());
        }
        if self.extra.is_empty() {
            None
        } else {
            Some(Value::Object(self.extra.clone()))
        }
    }
}

/// Why a device left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectReason {
    Disconnected,
    Expired,
    Shutdown,
}

/// Presence change for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNotice {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DisconnectReason>,
}

impl DeviceNotice {
    pub fn now(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: DisconnectReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Latest telemetry snapshot for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotice {
    pub device_id: String,
    pub telemetry: Value,
    pub timestamp: DateTime<Utc>,
}

/// Error reply sent to the connection whose message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

impl From<&super::RelayError> for ErrorNotice {
    fn from(err: &super::RelayError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// An event pushed to connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// Acknowledges a producer registration
    Registered(DeviceNotice),
    FrameRelayed(Arc<FrameEnvelope>),
    DeviceConnected(DeviceNotice),
    DeviceDisconnected(DeviceNotice),
    DeviceStatus(StatusNotice),
    DetectionRecorded(Arc<DetectionRecord>),
    ActiveDevices(Vec<SessionView>),
    /// Sent to a producer connection right before it is closed in favor of a newer one
    Superseded(DeviceNotice),
    Error(ErrorNotice),
}

impl RelayEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::Registered(_) => "registered",
            RelayEvent::FrameRelayed(_) => "frame-relayed",
            RelayEvent::DeviceConnected(_) => "device-connected",
            RelayEvent::DeviceDisconnected(_) => "device-disconnected",
            RelayEvent::DeviceStatus(_) => "device-status",
            RelayEvent::DetectionRecorded(_) => "detection-recorded",
            RelayEvent::ActiveDevices(_) => "active-devices",
            RelayEvent::Superseded(_) => "superseded",
            RelayEvent::Error(_) => "error",
        }
    }

    /// The `data` part alone, for transports that carry the name out of band.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}
