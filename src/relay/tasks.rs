//! Background tasks attached to the broker.

use super::RelayBroker;
use crate::persistence::DetectionRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodically expires sessions that outlived the liveness window.
pub struct LivenessSweeper {
    broker: Arc<RelayBroker>,
    interval: Duration,
}

impl LivenessSweeper {
    pub fn new(broker: Arc<RelayBroker>, interval: Duration) -> Self {
        Self { broker, interval }
    }

    /// Run one sweep. Returns the expired device ids.
    pub fn sweep(&self) -> Vec<String> {
        self.broker.expire_stale()
    }

    /// Start the sweep loop, stopping when `cancel_token` fires.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                interval_seconds = self.interval.as_secs(),
                window_seconds = self.broker.config().liveness_window_seconds,
                "Liveness sweeper started"
            );

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Liveness sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let expired = self.sweep();
                        if !expired.is_empty() {
                            tracing::debug!(expired = expired.len(), "Liveness sweep completed");
                        }
                    }
                }
            }
        })
    }
}

/// Forwards records stored by the persistence pipeline to viewers.
pub struct DetectionForwarder {
    broker: Arc<RelayBroker>,
    recorded: broadcast::Receiver<Arc<DetectionRecord>>,
}

impl DetectionForwarder {
    pub fn new(broker: Arc<RelayBroker>, recorded: broadcast::Receiver<Arc<DetectionRecord>>) -> Self {
        Self { broker, recorded }
    }

    pub fn start(mut self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    received = self.recorded.recv() => match received {
                        Ok(record) => {
                            let out = self.broker.on_detection_recorded(record);
                            tracing::trace!(viewers = out.delivered, "Detection pushed to viewers");
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Detection notifications lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Detection forwarder stopped");
        })
    }
}
