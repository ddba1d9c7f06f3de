//! Transport adapters.
//!
//! Exposes the relay broker over:
//! - `GET /ws` - bidirectional WebSocket channel for producers and viewers
//! - `POST /api/live/stream` - one frame per request (HTTP fallback)
//! - `POST /api/devices/status` - one telemetry snapshot per request
//! - `POST /api/devices/:device_id/heartbeat` - liveness ping
//! - `POST /api/detections` - one detection, stored before the response
//! - `GET /api/live/events?deviceId=` - server-sent event stream for viewers
//! - `GET /api/devices/active` - active device snapshot
//! - `GET /health`, `GET /metrics`, `GET /api/stats`
//!
//! Every adapter calls the same broker operations; only delivery mechanics differ.

pub mod error;
mod http;
mod sse;
mod websocket;

pub use error::{ApiError, ApiErrorBody};
pub use http::{
    ActiveDevicesResponse, CreatedDetection, DetectionCreated, FrameAccepted, HeartbeatAck,
    StatusAccepted,
};
pub use sse::{to_sse_event, EventsQuery};

use crate::config::{EdgewatchConfig, RelayConfig};
use crate::metrics::MetricsCollector;
use crate::relay::RelayBroker;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

/// Shared state for all handlers.
pub struct AppState {
    pub broker: Arc<RelayBroker>,
    pub config: Arc<EdgewatchConfig>,
    pub start_time: Instant,
    pub metrics_collector: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(broker: Arc<RelayBroker>, config: Arc<EdgewatchConfig>) -> Self {
        let start_time = Instant::now();

        let prometheus_handle = crate::metrics::setup_metrics().unwrap_or_else(|e| {
            tracing::debug!("Metrics already initialized, creating new handle: {}", e);
            crate::metrics::PrometheusBuilder::new()
                .build_recorder()
                .handle()
        });

        let metrics_collector = Arc::new(MetricsCollector::new(
            Arc::clone(&broker),
            start_time,
            prometheus_handle,
        ));

        Self {
            broker,
            config,
            start_time,
            metrics_collector,
        }
    }
}

/// Largest request body or WebSocket message accepted.
///
/// Leaves headroom above the payload bound so an oversized frame still
/// reaches the broker and gets a `payload_too_large` answer instead of a
/// transport-level rejection.
pub fn message_limit(config: &RelayConfig) -> usize {
    config
        .max_payload_bytes
        .saturating_mul(2)
        .saturating_add(64 * 1024)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = message_limit(&state.config.relay);
    let timeout = state.config.server.request_timeout();

    Router::new()
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/live/stream", post(http::submit_frame))
        .route("/api/live/events", get(sse::event_stream))
        .route("/api/devices/active", get(http::list_active_devices))
        .route("/api/devices/status", post(http::submit_status))
        .route("/api/devices/:device_id/heartbeat", post(http::heartbeat))
        .route("/api/detections", post(http::submit_detection))
        .route("/health", get(http::health))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .route("/api/stats", get(crate::metrics::handler::stats_handler))
        // The extractor's own 2 MiB cap would undercut the frame bound
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_limit_leaves_headroom() {
        let config = RelayConfig {
            max_payload_bytes: 1024,
            ..RelayConfig::default()
        };
        assert_eq!(message_limit(&config), 2048 + 64 * 1024);

        let config = RelayConfig {
            max_payload_bytes: usize::MAX,
            ..RelayConfig::default()
        };
        assert_eq!(message_limit(&config), usize::MAX);
    }
}
