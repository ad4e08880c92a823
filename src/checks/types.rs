//! Result types shared by every check strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The kind of check performed against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Plain availability of one or more endpoints
    Uptime,
    /// Login form submission with stored credentials
    Authentication,
    /// Authenticated request to a protected endpoint
    ProtectedResource,
}

impl CheckKind {
    /// Order in which checks run within a single target.
    pub const ALL: [CheckKind; 3] = [
        CheckKind::Uptime,
        CheckKind::Authentication,
        CheckKind::ProtectedResource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Uptime => "uptime",
            CheckKind::Authentication => "authentication",
            CheckKind::ProtectedResource => "protected_resource",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    /// Target answered correctly but something is degraded (slow, missing content)
    Warning,
    Failure,
    /// Request deadline exceeded
    Timeout,
}

impl CheckStatus {
    /// Failures and timeouts count against the circuit breaker.
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Failure | CheckStatus::Timeout)
    }

    fn severity(&self) -> u8 {
        match self {
            CheckStatus::Success => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Timeout => 2,
            CheckStatus::Failure => 3,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: CheckStatus) -> CheckStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Normalized, immutable result of one check attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target: String,
    pub kind: CheckKind,
    pub status: CheckStatus,
    pub latency_ms: u64,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(
        target: impl Into<String>,
        kind: CheckKind,
        status: CheckStatus,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            target: target.into(),
            kind,
            status,
            latency_ms: latency.as_millis() as u64,
            status_code: None,
            detail: None,
            timestamp,
        }
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}
