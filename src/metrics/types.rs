//! # Metrics Types
//!
//! Data structures for the JSON stats response.

use crate::relay::RelayStats;
use serde::Serialize;

/// JSON response for GET /api/stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Relay uptime in seconds since startup
    pub uptime_seconds: u64,
    pub relay: RelayStats,
    pub devices: DeviceCounts,
    /// Present when detection persistence is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceStats>,
}

/// Sessions grouped by liveness status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceCounts {
    pub streaming: usize,
    pub idle: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceStats {
    /// Store backend name (`memory`, `jsonl`, `http`)
    pub store: &'static str,
    pub in_flight: usize,
}
