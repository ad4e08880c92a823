//! Error types for the state store.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt failed; the previous snapshot on disk is intact
    #[error("failed to persist state to {path} after {attempts} attempts: {message}")]
    Persist {
        path: PathBuf,
        attempts: u32,
        message: String,
    },
}
