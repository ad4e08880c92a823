//! Errors raised while loading or checking a [`WatchConfig`](super::WatchConfig).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {0} does not exist")]
    NotFound(PathBuf),

    #[error("{path} is not valid TOML: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value parsed but is out of range or inconsistent with another one
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted path of the offending setting, e.g. `targets[2].url`.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
