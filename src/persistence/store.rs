//! Durable detection stores.
//!
//! The pipeline only depends on [`DetectionStore`]; which implementation
//! backs it is a deployment choice made in `[persistence]` config.

use super::DetectionRecord;
use crate::config::{PersistenceConfig, StoreKind};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors from a durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected record with status {status}")]
    Rejected { status: u16 },

    #[error("store misconfigured: {0}")]
    Config(String),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("persistence backlog full")]
    Busy,
}

/// Write-only sink for detection records.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Persist one record, returning the identifier it was stored under.
    async fn save(&self, record: &DetectionRecord) -> Result<String, StoreError>;

    /// Short name for logs and metric labels.
    fn name(&self) -> &'static str;
}

/// Build the store selected by config.
pub fn build_store(config: &PersistenceConfig) -> Result<Arc<dyn DetectionStore>, StoreError> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(MemoryDetectionStore::new())),
        StoreKind::Jsonl => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| StoreError::Config("jsonl store requires a path".to_string()))?;
            Ok(Arc::new(JsonlDetectionStore::new(path)))
        }
        StoreKind::Http => {
            let url = config
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| StoreError::Config("http store requires a url".to_string()))?;
            Ok(Arc::new(HttpDetectionStore::new(
                url,
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
    }
}

/// In-process store. Useful for tests and for running without a backend.
#[derive(Debug, Default)]
pub struct MemoryDetectionStore {
    records: DashMap<String, DetectionRecord>,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<DetectionRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// All records, oldest arrival first.
    pub fn records(&self) -> Vec<DetectionRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DetectionStore for MemoryDetectionStore {
    async fn save(&self, record: &DetectionRecord) -> Result<String, StoreError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(record.id.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Appends one JSON object per line to a local file.
///
/// The file is opened lazily on first write and kept open afterwards.
pub struct JsonlDetectionStore {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlDetectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DetectionStore for JsonlDetectionStore {
    async fn save(&self, record: &DetectionRecord) -> Result<String, StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(record.id.clone())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// POSTs each record as JSON to a detections endpoint.
///
/// The stored id is taken from the response body (`id`, `detectionId`, or
/// `data.detectionId`) when present, otherwise the record's own id.
pub struct HttpDetectionStore {
    client: reqwest::Client,
    url: String,
}

impl HttpDetectionStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DetectionStore for HttpDetectionStore {
    async fn save(&self, record: &DetectionRecord) -> Result<String, StoreError> {
        let response = self.client.post(&self.url).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let id = body
            .get("id")
            .or_else(|| body.get("detectionId"))
            .or_else(|| body.pointer("/data/detectionId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| record.id.clone());
        Ok(id)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
