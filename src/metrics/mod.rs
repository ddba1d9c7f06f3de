//! # Metrics Collection Module
//!
//! Prometheus export and JSON stats for the relay.
//!
//! ## Overview
//!
//! This module exposes two endpoints:
//! - `GET /metrics` - Prometheus text format metrics
//! - `GET /api/stats` - JSON format statistics
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `edgewatch_frames_relayed_total` - Frames accepted and fanned out
//! - `edgewatch_frames_rejected_total{reason}` - Frames rejected by validation
//! - `edgewatch_viewer_drops_total{event}` - Events dropped for slow viewers
//! - `edgewatch_detections_persisted_total` - Detections written to the store
//! - `edgewatch_detections_failed_total{reason}` - Failed or timed-out writes
//! - `edgewatch_detections_dropped_total` - Detections shed at the in-flight limit
//!
//! **Histograms:**
//! - `edgewatch_frame_payload_bytes` - Accepted payload sizes
//! - `edgewatch_detection_save_seconds{store}` - Store write latency
//!
//! **Gauges** (computed at scrape time):
//! - `edgewatch_sessions_active` - Sessions in the registry
//! - `edgewatch_devices{status}` - Sessions by liveness status
//! - `edgewatch_connections_open` - Open WebSocket/SSE connections
//! - `edgewatch_producers_connected` / `edgewatch_viewers_connected`
//! - `edgewatch_frames_cached` - Devices with a cached latest frame
//! - `edgewatch_detections_in_flight` - Pending store writes

pub mod handler;
pub mod types;

pub use types::*;

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::DeviceStatus;
use crate::relay::RelayBroker;
use std::sync::Arc;
use std::time::Instant;

/// Central coordinator for metrics collection and gauge computation.
pub struct MetricsCollector {
    broker: Arc<RelayBroker>,
    /// Relay startup time for uptime calculation
    start_time: Instant,
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(
        broker: Arc<RelayBroker>,
        start_time: Instant,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        Self {
            broker,
            start_time,
            prometheus_handle,
        }
    }

    /// Count sessions by liveness status as of now.
    pub fn device_counts(&self) -> DeviceCounts {
        let mut counts = DeviceCounts::default();
        for view in self.broker.list_active_devices() {
            match view.status {
                DeviceStatus::Streaming => counts.streaming += 1,
                DeviceStatus::Idle => counts.idle += 1,
                DeviceStatus::Offline => counts.offline += 1,
            }
        }
        counts
    }

    /// Refresh gauges derived from broker state.
    pub fn update_relay_gauges(&self) {
        let stats = self.broker.stats();
        metrics::gauge!("edgewatch_sessions_active").set(stats.sessions as f64);
        metrics::gauge!("edgewatch_connections_open").set(stats.connections as f64);
        metrics::gauge!("edgewatch_producers_connected").set(stats.producers as f64);
        metrics::gauge!("edgewatch_viewers_connected").set(stats.viewers as f64);
        metrics::gauge!("edgewatch_frames_cached").set(stats.cached_frames as f64);

        let counts = self.device_counts();
        metrics::gauge!("edgewatch_devices", "status" => "streaming").set(counts.streaming as f64);
        metrics::gauge!("edgewatch_devices", "status" => "idle").set(counts.idle as f64);
        metrics::gauge!("edgewatch_devices", "status" => "offline").set(counts.offline as f64);

        let in_flight = self.broker.pipeline().map_or(0, |p| p.in_flight());
        metrics::gauge!("edgewatch_detections_in_flight").set(in_flight as f64);
    }

    /// Get uptime in seconds since relay startup.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn broker(&self) -> &Arc<RelayBroker> {
        &self.broker
    }

    /// Render Prometheus metrics in text format.
    pub fn render_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Initialize Prometheus metrics exporter with custom histogram buckets.
///
/// Payload buckets run from 1 KiB to 16 MiB; save latency buckets from 5 ms to 30 s.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let payload_buckets = &[
        1024.0, 8192.0, 32768.0, 131072.0, 524288.0, 1048576.0, 4194304.0, 16777216.0,
    ];

    let save_buckets = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("edgewatch_frame_payload_bytes".to_string()),
            payload_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full("edgewatch_detection_save_seconds".to_string()),
            save_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}
