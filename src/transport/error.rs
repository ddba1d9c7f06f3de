//! HTTP error envelope.

use crate::persistence::StoreError;
use crate::relay::RelayError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error response body: `{"error": {"message", "type", "code"}}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    fn new(message: impl Into<String>, r#type: &str, param: Option<&str>, code: &str) -> Self {
        Self {
            error: ApiErrorBody {
                message: message.into(),
                r#type: r#type.to_string(),
                param: param.map(str::to_string),
                code: Some(code.to_string()),
            },
        }
    }

    /// Create a bad request error (400).
    pub fn bad_request(message: &str) -> Self {
        Self::new(message, "invalid_request_error", None, "invalid_request_error")
    }

    /// Create a service unavailable error (503).
    pub fn service_unavailable(message: &str) -> Self {
        Self::new(message, "server_error", None, "service_unavailable")
    }

    fn status_code(&self) -> StatusCode {
        match self.error.code.as_deref() {
            Some("invalid_request_error")
            | Some("missing_device_id")
            | Some("missing_payload")
            | Some("malformed_message") => StatusCode::BAD_REQUEST,
            Some("payload_too_large") => StatusCode::PAYLOAD_TOO_LARGE,
            Some("role_mismatch") | Some("device_mismatch") | Some("stale_connection") => {
                StatusCode::CONFLICT
            }
            Some("unknown_connection") => StatusCode::NOT_FOUND,
            Some("reserved_device_id") => StatusCode::UNPROCESSABLE_ENTITY,
            Some("service_unavailable") | Some("store_busy") => StatusCode::SERVICE_UNAVAILABLE,
            Some("store_error") => StatusCode::BAD_GATEWAY,
            Some("store_timeout") => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let param = match &err {
            RelayError::MissingDeviceId
            | RelayError::ReservedDeviceId(_)
            | RelayError::DeviceMismatch { .. } => Some("deviceId"),
            RelayError::MissingPayload(_) | RelayError::PayloadTooLarge { .. } => Some("payload"),
            _ => None,
        };
        Self::new(err.to_string(), "relay_error", param, err.code())
    }
}

/// Keeps the rejection's own status: a body over the size limit is a 413,
/// not a generic 400.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(message, "invalid_request_error", None, "payload_too_large")
        } else {
            Self::bad_request(&message)
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::Timeout(_) => "store_timeout",
            StoreError::Busy => "store_busy",
            _ => "store_error",
        };
        Self::new(err.to_string(), "server_error", None, code)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
