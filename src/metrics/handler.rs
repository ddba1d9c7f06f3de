//! # Metrics HTTP Handlers
//!
//! Axum handlers for metrics endpoints.

use super::{PersistenceStats, StatsResponse};
use crate::transport::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// Handler for GET /metrics endpoint (Prometheus text format).
///
/// Always returns 200 with the Prometheus content type, even before any
/// metric has been recorded.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics_collector.update_relay_gauges();

    let metrics = state.metrics_collector.render_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics,
    )
}

/// Handler for GET /api/stats endpoint (JSON format).
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(compute_stats(&state))
}

pub fn compute_stats(state: &AppState) -> StatsResponse {
    let collector = &state.metrics_collector;
    let broker = collector.broker();

    StatsResponse {
        uptime_seconds: collector.uptime_seconds(),
        relay: broker.stats(),
        devices: collector.device_counts(),
        persistence: broker.pipeline().map(|pipeline| PersistenceStats {
            store: pipeline.store_name(),
            in_flight: pipeline.in_flight(),
        }),
    }
}
