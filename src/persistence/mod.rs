//! Detection persistence pipeline.
//!
//! Frames that carry detections are handed to [`DetectionPipeline::ingest`]
//! after they have been relayed. Ingest builds the normalized records
//! synchronously and spawns one background write per record, so the live
//! path never waits on the durable store. Failed or timed-out writes are
//! logged and counted, never retried, and never surface to the producer.
//!
//! Detections posted on their own go through [`DetectionPipeline::record`]
//! instead, which awaits the store so the caller learns the stored id.
//!
//! Successfully stored records are published on a broadcast channel; the
//! `serve` command forwards them to viewers as `detection-recorded` events.

mod record;
mod store;
mod taxonomy;

pub use record::DetectionRecord;
pub use store::{
    build_store, DetectionStore, HttpDetectionStore, JsonlDetectionStore, MemoryDetectionStore,
    StoreError,
};
pub use taxonomy::{normalize_category, HazardCategory, Severity};

use crate::config::PersistenceConfig;
use crate::relay::FrameEnvelope;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::task::TaskTracker;

const RECORDED_CHANNEL_CAPACITY: usize = 1024;

/// Fire-and-forget writer in front of a [`DetectionStore`].
pub struct DetectionPipeline {
    store: Arc<dyn DetectionStore>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    recorded: broadcast::Sender<Arc<DetectionRecord>>,
    timeout: Duration,
}

impl DetectionPipeline {
    /// Create a pipeline allowing `max_in_flight` concurrent writes.
    pub fn new(store: Arc<dyn DetectionStore>, max_in_flight: usize, timeout: Duration) -> Self {
        let (recorded, _) = broadcast::channel(RECORDED_CHANNEL_CAPACITY);
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tracker: TaskTracker::new(),
            recorded,
            timeout,
        }
    }

    /// Build the configured store and wrap it in a pipeline.
    pub fn from_config(config: &PersistenceConfig) -> Result<Self, StoreError> {
        let store = build_store(config)?;
        Ok(Self::new(
            store,
            config.max_in_flight,
            Duration::from_secs(config.timeout_seconds),
        ))
    }

    /// Subscribe to records as they are successfully stored.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DetectionRecord>> {
        self.recorded.subscribe()
    }

    /// Queue one write per detection in `envelope`. Returns how many were queued.
    ///
    /// Never blocks and never fails: detections beyond the in-flight limit
    /// are dropped with a warning.
    pub fn ingest(&self, envelope: &FrameEnvelope) -> usize {
        if envelope.detections.is_empty() {
            return 0;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(
                device_id = %envelope.device_id,
                "No async runtime available, detections not persisted"
            );
            return 0;
        }

        let mut queued = 0;
        for record in DetectionRecord::from_envelope(envelope) {
            let permit = match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    metrics::counter!("edgewatch_detections_dropped_total").increment(1);
                    tracing::warn!(
                        device_id = %record.device_id,
                        record_id = %record.id,
                        "Persistence backlog full, dropping detection"
                    );
                    continue;
                }
            };

            let store = Arc::clone(&self.store);
            let recorded = self.recorded.clone();
            let timeout = self.timeout;
            self.tracker.spawn(async move {
                let _permit = permit;
                persist(store, record, timeout, recorded).await;
            });
            queued += 1;
        }
        queued
    }

    /// Store one record now and return it under the id the store assigned.
    ///
    /// Shares the in-flight bound with background writes and fails with
    /// [`StoreError::Busy`] instead of waiting for a slot. Stored records are
    /// published to subscribers like ingested ones.
    pub async fn record(&self, record: DetectionRecord) -> Result<Arc<DetectionRecord>, StoreError> {
        let _permit = self.permits.try_acquire().map_err(|_| {
            metrics::counter!("edgewatch_detections_dropped_total").increment(1);
            StoreError::Busy
        })?;
        let stored = Arc::new(save_record(self.store.as_ref(), record, self.timeout).await?);
        // No subscribers is fine
        let _ = self.recorded.send(Arc::clone(&stored));
        Ok(stored)
    }

    /// Writes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Stop accepting new work and wait for in-flight writes to settle.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn persist(
    store: Arc<dyn DetectionStore>,
    record: DetectionRecord,
    timeout: Duration,
    recorded: broadcast::Sender<Arc<DetectionRecord>>,
) {
    if let Ok(stored) = save_record(store.as_ref(), record, timeout).await {
        // No subscribers is fine
        let _ = recorded.send(Arc::new(stored));
    }
}

async fn save_record(
    store: &dyn DetectionStore,
    mut record: DetectionRecord,
    timeout: Duration,
) -> Result<DetectionRecord, StoreError> {
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, store.save(&record)).await;
    metrics::histogram!("edgewatch_detection_save_seconds", "store" => store.name())
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(Ok(id)) => {
            metrics::counter!("edgewatch_detections_persisted_total").increment(1);
            tracing::debug!(
                device_id = %record.device_id,
                record_id = %id,
                category = %record.category,
                severity = ?record.severity,
                "Detection persisted"
            );
            record.id = id;
            Ok(record)
        }
        Ok(Err(e)) => {
            metrics::counter!("edgewatch_detections_failed_total", "reason" => "store")
                .increment(1);
            tracing::error!(
                device_id = %record.device_id,
                record_id = %record.id,
                store = store.name(),
                error = %e,
                "Failed to persist detection"
            );
            Err(e)
        }
        Err(_) => {
            metrics::counter!("edgewatch_detections_failed_total", "reason" => "timeout")
                .increment(1);
            tracing::error!(
                device_id = %record.device_id,
                record_id = %record.id,
                store = store.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Timed out persisting detection"
            );
            Err(StoreError::Timeout(timeout))
        }
    }
}
