//! Detection persistence configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which durable store backs the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local map, lost on restart
    #[default]
    Memory,
    /// Append-only JSON-lines file
    Jsonl,
    /// POST each record to a downstream service
    Http,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "jsonl" => Ok(StoreKind::Jsonl),
            "http" => Ok(StoreKind::Http),
            _ => Err(format!("Invalid store kind: {}", s)),
        }
    }
}

/// Detection persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub store: StoreKind,
    /// File used by the `jsonl` store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Endpoint used by the `http` store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Writes allowed in flight at once; detections beyond this are dropped
    pub max_in_flight: usize,
    pub timeout_seconds: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: StoreKind::Memory,
            path: None,
            url: None,
            max_in_flight: 256,
            timeout_seconds: 10,
        }
    }
}
