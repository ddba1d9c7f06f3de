//! Request/response fallback for producers that cannot hold a WebSocket,
//! plus read-only device queries.

use super::{ApiError, AppState};
use crate::persistence::{DetectionRecord, HazardCategory, Severity};
use crate::registry::{DeviceStatus, SessionView};
use crate::relay::{normalize_device_id, DetectionReport, FrameSubmission, TelemetryReport};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAccepted {
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub detections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAccepted {
    pub device_id: String,
    /// `false` when the report carried no snapshot
    pub stored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    pub status: DeviceStatus,
}

/// `201 Created` body for a stored detection: `{"data": {"detectionId", ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionCreated {
    pub data: CreatedDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDetection {
    pub detection_id: String,
    pub device_id: String,
    pub category: HazardCategory,
    pub severity: Severity,
}

impl From<&DetectionRecord> for DetectionCreated {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            data: CreatedDetection {
                detection_id: record.id.clone(),
                device_id: record.device_id.clone(),
                category: record.category,
                severity: record.severity,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDevicesResponse {
    pub devices: Vec<SessionView>,
}

/// POST /api/live/stream
pub async fn submit_frame(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FrameSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<FrameAccepted>), ApiError> {
    let Json(submission) = body?;
    let envelope = state.broker.on_detached_frame(submission)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(FrameAccepted {
            device_id: envelope.device_id.clone(),
            received_at: envelope.received_at,
            detections: envelope.detections.len(),
        }),
    ))
}

/// POST /api/detections
///
/// Unlike frame detections, the write is awaited: the answer carries the
/// stored id, or the store's failure.
pub async fn submit_detection(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DetectionReport>, JsonRejection>,
) -> Result<(StatusCode, Json<DetectionCreated>), ApiError> {
    let Json(report) = body?;
    let device_id = normalize_device_id(report.device_id.as_deref())?;
    let pipeline = state
        .broker
        .pipeline()
        .ok_or_else(|| ApiError::service_unavailable("detection persistence is disabled"))?;

    let record = DetectionRecord::from_report(&device_id, &report, Utc::now());
    let stored = pipeline.record(record).await?;
    tracing::info!(
        device_id = %stored.device_id,
        record_id = %stored.id,
        category = %stored.category,
        "Detection submitted"
    );
    Ok((StatusCode::CREATED, Json(DetectionCreated::from(&*stored))))
}

/// POST /api/devices/status
pub async fn submit_status(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TelemetryReport>, JsonRejection>,
) -> Result<Json<StatusAccepted>, ApiError> {
    let Json(report) = body?;
    let device_id = normalize_device_id(report.device_id.as_deref())?;
    let stored = state.broker.on_detached_telemetry(report)?;
    Ok(Json(StatusAccepted { device_id, stored }))
}

/// POST /api/devices/:device_id/heartbeat
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<HeartbeatAck>, ApiError> {
    let session = state.broker.on_detached_heartbeat(&device_id)?;
    let status = session.status_at(Utc::now(), state.broker.config().liveness_window());
    Ok(Json(HeartbeatAck {
        device_id: session.device_id,
        last_seen: session.last_seen,
        status,
    }))
}

/// GET /api/devices/active
pub async fn list_active_devices(State(state): State<Arc<AppState>>) -> Json<ActiveDevicesResponse> {
    Json(ActiveDevicesResponse {
        devices: state.broker.list_active_devices(),
    })
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.broker.stats();
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
        "sessions": stats.sessions,
        "connections": stats.connections,
    }))
}
