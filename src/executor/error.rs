//! Error types for the guarded executor.

use crate::guard::{GuardError, Rejection};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`GuardedExecutor::execute`](super::GuardedExecutor::execute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// URL refused by the request guard; no connection was made
    #[error("blocked by request guard: {0}")]
    GuardRejected(Rejection),

    #[error("DNS resolution failed for '{host}': {message}")]
    Dns { host: String, message: String },

    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response body exceeds {limit} bytes")]
    SizeExceeded { limit: usize },

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("invalid redirect location '{location}': {message}")]
    InvalidRedirect { location: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("executor is shut down")]
    Closed,
}

impl ExecutorError {
    /// Transient network errors are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutorError::Dns { .. }
                | ExecutorError::Timeout(_)
                | ExecutorError::Connect(_)
                | ExecutorError::Transport(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutorError::Timeout(_))
    }
}

impl From<GuardError> for ExecutorError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Rejected(rejection) => ExecutorError::GuardRejected(rejection),
            GuardError::Resolution { host, message } => ExecutorError::Dns { host, message },
        }
    }
}

/// Map a reqwest error, surfacing guard rejections raised by the client's
/// resolver at connect time.
pub(crate) fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> ExecutorError {
    if let Some(guard) = find_guard_error(&err) {
        return guard.clone().into();
    }
    if err.is_timeout() {
        ExecutorError::Timeout(timeout)
    } else if err.is_connect() {
        ExecutorError::Connect(err.to_string())
    } else {
        ExecutorError::Transport(err.to_string())
    }
}

fn find_guard_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a GuardError> {
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(guard) = current.downcast_ref::<GuardError>() {
            return Some(guard);
        }
        source = current.source();
    }
    None
}
