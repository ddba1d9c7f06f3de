use super::{FrameEnvelope, FrameSubmission, RelayError};
use chrono::{DateTime, Utc};

/// Trimmed, non-empty device identifier.
///
/// `*` and `all` (any case) are refused: a viewer watching either gets
/// every device, so a producer by that name could never be watched alone.
pub fn normalize_device_id(raw: Option<&str>) -> Result<String, RelayError> {
    match raw.map(str::trim) {
        Some(id) if is_reserved(id) => Err(RelayError::ReservedDeviceId(id.to_string())),
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(RelayError::MissingDeviceId),
    }
}

fn is_reserved(id: &str) -> bool {
    id == "*" || id.eq_ignore_ascii_case("all")
}

/// Turn a submission into an envelope, or say why it cannot be relayed.
///
/// `max_payload_bytes` bounds the encoded payload length; a payload of
/// exactly the bound is accepted.
pub fn validate_frame(
    submission: FrameSubmission,
    max_payload_bytes: usize,
    received_at: DateTime<Utc>,
) -> Result<FrameEnvelope, RelayError> {
    let device_id = normalize_device_id(submission.device_id.as_deref())?;

    let payload = match submission.payload {
        Some(payload) if !payload.is_empty() => payload,
        _ => return Err(RelayError::MissingPayload(device_id)),
    };
    if payload.len() > max_payload_bytes {
        return Err(RelayError::PayloadTooLarge {
            size: payload.len(),
            limit: max_payload_bytes,
        });
    }

    Ok(FrameEnvelope {
        device_id,
        payload,
        detections: submission.detections.unwrap_or_default(),
        gps: submission.gps,
        telemetry: submission.telemetry,
        timestamp: submission.timestamp,
        received_at,
    })
}
