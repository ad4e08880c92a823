//! Configuration for the guarded HTTP executor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cap for any response body (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Default cap for markup that will be scanned (5 MiB).
pub const DEFAULT_MAX_MARKUP_BYTES: usize = 5 * 1024 * 1024;

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Deadline for a whole request, redirects included
    pub timeout_seconds: u64,
    pub max_body_bytes: usize,
    pub max_markup_bytes: usize,
    pub max_redirects: usize,
    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_seconds: u64,
    /// Requests in flight across all hosts
    pub max_connections: usize,
    /// Requests in flight to a single host
    pub max_connections_per_host: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_markup_bytes: DEFAULT_MAX_MARKUP_BYTES,
            max_redirects: 5,
            pool_max_idle_per_host: 4,
            pool_idle_timeout_seconds: 90,
            max_connections: 32,
            max_connections_per_host: 4,
            user_agent: format!("sitewatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
