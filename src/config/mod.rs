//! Configuration module for Edgewatch
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`EDGEWATCH_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use edgewatch::config::EdgewatchConfig;
//!
//! let config = EdgewatchConfig::default();
//! assert_eq!(config.server.port, 5000);
//!
//! let toml = r#"
//! [relay]
//! liveness_window_seconds = 60
//! "#;
//! let config: EdgewatchConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.relay.liveness_window_seconds, 60);
//! ```

pub mod error;
pub mod logging;
pub mod persistence;
pub mod relay;
pub mod server;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig, LOG_COMPONENTS};
pub use persistence::{PersistenceConfig, StoreKind};
pub use relay::{RelayConfig, DEFAULT_MAX_PAYLOAD_BYTES};
pub use server::ServerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Example configuration written by `edgewatch config init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../../edgewatch.example.toml");

/// Unified configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EdgewatchConfig {
    /// HTTP/WebSocket listener
    pub server: ServerConfig,
    /// Broker and liveness tuning
    pub relay: RelayConfig,
    /// Detection persistence pipeline
    pub persistence: PersistenceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EdgewatchConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("EDGEWATCH_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("EDGEWATCH_HOST") {
            self.server.host = host;
        }

        if let Ok(level) = std::env::var("EDGEWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EDGEWATCH_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(window) = std::env::var("EDGEWATCH_LIVENESS_WINDOW") {
            if let Ok(w) = window.parse() {
                self.relay.liveness_window_seconds = w;
            }
        }
        if let Ok(max) = std::env::var("EDGEWATCH_MAX_PAYLOAD_BYTES") {
            if let Ok(m) = max.parse() {
                self.relay.max_payload_bytes = m;
            }
        }

        if let Ok(store) = std::env::var("EDGEWATCH_STORE") {
            if let Ok(s) = store.parse() {
                self.persistence.store = s;
            }
        }
        if let Ok(path) = std::env::var("EDGEWATCH_STORE_PATH") {
            self.persistence.path = Some(path.into());
        }
        if let Ok(url) = std::env::var("EDGEWATCH_STORE_URL") {
            self.persistence.url = Some(url);
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "port must be non-zero"));
        }
        if self.server.request_timeout_seconds == 0 {
            return Err(invalid(
                "server.request_timeout_seconds",
                "request timeout must be non-zero",
            ));
        }
        if self.relay.liveness_window_seconds == 0 {
            return Err(invalid(
                "relay.liveness_window_seconds",
                "liveness window must be non-zero",
            ));
        }
        if self.relay.max_payload_bytes == 0 {
            return Err(invalid(
                "relay.max_payload_bytes",
                "payload bound must be non-zero",
            ));
        }
        if self.relay.viewer_buffer == 0 {
            return Err(invalid(
                "relay.viewer_buffer",
                "viewer buffer must hold at least one event",
            ));
        }

        if let Some(name) = self.logging.unknown_components().first() {
            return Err(invalid(
                "logging.component_levels",
                &format!(
                    "unknown component '{}' (expected one of {})",
                    name,
                    LOG_COMPONENTS.join(", ")
                ),
            ));
        }

        if self.persistence.enabled {
            if self.persistence.max_in_flight == 0 {
                return Err(invalid(
                    "persistence.max_in_flight",
                    "must allow at least one write in flight",
                ));
            }
            match self.persistence.store {
                StoreKind::Jsonl if self.persistence.path.is_none() => {
                    return Err(invalid(
                        "persistence.path",
                        "jsonl store requires a file path",
                    ));
                }
                StoreKind::Http if self.persistence.url.as_deref().unwrap_or("").is_empty() => {
                    return Err(invalid("persistence.url", "http store requires a URL"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
