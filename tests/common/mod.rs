//! Shared test utilities for Edgewatch integration tests.
//!
//! Provides broker/router builders, outbound-queue helpers and stub
//! detection stores.

#![allow(dead_code)]

use async_trait::async_trait;
use edgewatch::config::{EdgewatchConfig, RelayConfig};
use edgewatch::persistence::{
    DetectionPipeline, DetectionRecord, DetectionStore, MemoryDetectionStore, StoreError,
};
use edgewatch::relay::{Detection, Outbound, RelayBroker, RelayEvent};
use edgewatch::transport::{create_router, AppState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Broker Builders
// =============================================================================

pub fn broker() -> RelayBroker {
    RelayBroker::new(RelayConfig::default(), None)
}

pub fn broker_with_config(config: RelayConfig) -> RelayBroker {
    RelayBroker::new(config, None)
}

/// Broker wired to a pipeline over `store`.
pub fn broker_with_store(store: Arc<dyn DetectionStore>) -> (RelayBroker, Arc<DetectionPipeline>) {
    let pipeline = Arc::new(DetectionPipeline::new(store, 16, Duration::from_secs(1)));
    let broker = RelayBroker::new(RelayConfig::default(), Some(Arc::clone(&pipeline)));
    (broker, pipeline)
}

pub fn memory_store() -> Arc<MemoryDetectionStore> {
    Arc::new(MemoryDetectionStore::new())
}

// =============================================================================
// Router Builders
// =============================================================================

pub fn test_state(config: EdgewatchConfig) -> Arc<AppState> {
    let broker = Arc::new(RelayBroker::new(config.relay.clone(), None));
    Arc::new(AppState::new(broker, Arc::new(config)))
}

pub fn test_app() -> (axum::Router, Arc<AppState>) {
    test_app_with(EdgewatchConfig::default())
}

pub fn test_app_with(config: EdgewatchConfig) -> (axum::Router, Arc<AppState>) {
    let state = test_state(config);
    (create_router(Arc::clone(&state)), state)
}

/// Router whose broker persists detections into `store`.
pub fn test_app_with_store(store: Arc<dyn DetectionStore>) -> (axum::Router, Arc<AppState>) {
    let config = EdgewatchConfig::default();
    let pipeline = Arc::new(DetectionPipeline::new(store, 16, Duration::from_secs(1)));
    let broker = Arc::new(RelayBroker::new(config.relay.clone(), Some(pipeline)));
    let state = Arc::new(AppState::new(broker, Arc::new(config)));
    (create_router(Arc::clone(&state)), state)
}

// =============================================================================
// Outbound Queue Helpers
// =============================================================================

/// Everything currently queued for a connection.
pub fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

pub fn events(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Arc<RelayEvent>> {
    drain(rx)
        .into_iter()
        .filter_map(|item| match item {
            Outbound::Event(event) => Some(event),
            Outbound::Close => None,
        })
        .collect()
}

pub fn frame_payloads(events: &[Arc<RelayEvent>]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match &**event {
            RelayEvent::FrameRelayed(frame) => Some(frame.payload.clone()),
            _ => None,
        })
        .collect()
}

pub fn detection(label: &str, confidence: f64, severity: &str) -> Detection {
    Detection {
        label: Some(label.to_string()),
        severity: Some(severity.to_string()),
        confidence: Some(confidence),
        bounding_box: None,
        location: None,
    }
}

// =============================================================================
// Stub Stores
// =============================================================================

/// Store that rejects every write.
#[derive(Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl DetectionStore for FailingStore {
    async fn save(&self, _record: &DetectionRecord) -> Result<String, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected { status: 503 })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Store that never answers within any reasonable timeout.
pub struct StalledStore;

#[async_trait]
impl DetectionStore for StalledStore {
    async fn save(&self, _record: &DetectionRecord) -> Result<String, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("never".to_string())
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}
