//! Configuration shared by the check strategies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and latency thresholds applied to every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    /// Attempts per check, first one included; only transient errors retry
    pub max_attempts: u32,
    /// Base delay between attempts, doubled each time
    pub retry_backoff_ms: u64,
    /// Latency above which a passing check is downgraded to a warning
    pub warning_latency_ms: u64,
    /// Latency reported as critical in logs
    pub critical_latency_ms: u64,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 500,
            warning_latency_ms: 3000,
            critical_latency_ms: 10000,
        }
    }
}

impl CheckSettings {
    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(6);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let settings = CheckSettings {
            retry_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(settings.backoff(1), Duration::from_millis(100));
        assert_eq!(settings.backoff(2), Duration::from_millis(200));
        assert_eq!(settings.backoff(3), Duration::from_millis(400));
    }
}
