//! Errors raised while loading or validating `edgewatch.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file {} does not exist (create one with `edgewatch config init`)", .0.display())]
    NotFound(PathBuf),

    #[error("config file is not valid TOML: {0}")]
    Parse(String),

    /// A value parsed but the relay cannot run with it.
    #[error("invalid value for '{field}': {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    /// Dotted key of the offending setting, e.g. `relay.liveness_window_seconds`.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
