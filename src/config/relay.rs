//! Relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upper bound for a single frame payload (10 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Tuning for the relay broker and liveness tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// A producer silent for longer than this is considered offline
    pub liveness_window_seconds: u64,
    /// Frames whose payload exceeds this many bytes are rejected
    pub max_payload_bytes: usize,
    /// Events queued per viewer connection before live frames are dropped for it
    pub viewer_buffer: usize,
    /// Seconds between liveness sweeps; 0 disables the sweeper
    pub sweep_interval_seconds: u64,
}

impl RelayConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn sweep_enabled(&self) -> bool {
        self.sweep_interval_seconds > 0
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            liveness_window_seconds: 30,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            viewer_buffer: 64,
            sweep_interval_seconds: 10,
        }
    }
}
