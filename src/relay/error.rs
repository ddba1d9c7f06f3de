/// Reasons the broker refuses a producer or viewer message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("message is missing a device identifier")]
    MissingDeviceId,

    #[error("'{0}' is reserved for watching every device and cannot name one")]
    ReservedDeviceId(String),

    #[error("frame from device '{0}' has no payload")]
    MissingPayload(String),

    #[error("frame payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("connection is a {actual} and cannot act as a {expected}")]
    RoleMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("connection is registered as '{bound}' and cannot speak for '{requested}'")]
    DeviceMismatch { bound: String, requested: String },

    #[error("session for device '{0}' was superseded or expired")]
    StaleConnection(String),

    #[error("unknown connection: {0}")]
    UnknownConnection(String),
}

impl RelayError {
    /// Stable machine-readable code, used in error events and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MissingDeviceId => "missing_device_id",
            RelayError::ReservedDeviceId(_) => "reserved_device_id",
            RelayError::MissingPayload(_) => "missing_payload",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::MalformedMessage(_) => "malformed_message",
            RelayError::RoleMismatch { .. } => "role_mismatch",
            RelayError::DeviceMismatch { .. } => "device_mismatch",
            RelayError::StaleConnection(_) => "stale_connection",
            RelayError::UnknownConnection(_) => "unknown_connection",
        }
    }
}
