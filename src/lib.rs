//! Edgewatch - real-time frame relay for edge-AI road hazard sensing units
//!
//! Producer devices stream annotated camera frames, telemetry and
//! heartbeats; viewers subscribe to one device or to all of them. The relay
//! tracks device sessions with a liveness window, caches each device's
//! latest frame for late joiners, and hands detections to a fire-and-forget
//! persistence pipeline.
//!
//! The core lives in [`relay::RelayBroker`]; [`transport`] exposes it over
//! WebSocket, HTTP and server-sent events.

pub mod cache;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod relay;
pub mod transport;
