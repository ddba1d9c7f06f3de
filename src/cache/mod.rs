//! Latest-frame cache.
//!
//! Holds the most recent relayed frame per device so a viewer that starts
//! watching mid-stream sees a picture immediately instead of waiting for
//! the next frame. Entries are shared `Arc`s: the same envelope is handed to
//! every viewer and to the persistence pipeline without copying the payload.

use crate::relay::FrameEnvelope;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry per device, last write wins.
#[derive(Debug, Default)]
pub struct FrameCache {
    frames: HashMap<String, Arc<FrameEnvelope>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached frame for the envelope's device.
    pub fn put(&mut self, envelope: Arc<FrameEnvelope>) -> Option<Arc<FrameEnvelope>> {
        self.frames.insert(envelope.device_id.clone(), envelope)
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<FrameEnvelope>> {
        self.frames.get(device_id).cloned()
    }

    /// Drop the cached frame. Evicting an absent device is a no-op.
    pub fn evict(&mut self, device_id: &str) -> Option<Arc<FrameEnvelope>> {
        self.frames.remove(device_id)
    }

    /// All cached frames, ordered by device id.
    pub fn all(&self) -> Vec<Arc<FrameEnvelope>> {
        let mut frames: Vec<_> = self.frames.values().cloned().collect();
        frames.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
