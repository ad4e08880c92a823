//! Error types for engine construction.

use crate::config::ConfigError;
use crate::executor::ExecutorError;
use thiserror::Error;

/// Errors that prevent an engine from being built.
///
/// Failures during a cycle are not errors: they become check results.
/// Only persisting the cycle can fail, with [`crate::state::StoreError`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP executor: {0}")]
    Executor(#[from] ExecutorError),
}
