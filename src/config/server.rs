//! Listener for the WebSocket, HTTP fallback and event stream endpoints.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. IPv6 literals may be given bare (`::`).
    pub host: String,
    pub port: u16,
    /// Deadline for producing a response. A WebSocket or event stream is
    /// past that point once established, so it is not cut off.
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    /// `host:port`, bracketing bare IPv6 literals.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_seconds: 30,
        }
    }
}
