//! Persisted monitoring state: per-target history, breaker state and
//! lifetime counters, plus the crash-safe store that writes it.
//!
//! All maps are `BTreeMap`s so a snapshot serializes to the same bytes
//! every time; persisting an unchanged state is a no-op on content.

mod config;
mod error;
mod history;
mod store;

pub use config::{StateConfig, DEFAULT_HISTORY_CAPACITY};
pub use error::StoreError;
pub use history::TargetHistory;
pub use store::StateStore;

use crate::breaker::BreakerState;
use crate::checks::{CheckKind, CheckResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything written to disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub global: GlobalState,
    pub targets: BTreeMap<String, TargetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalState {
    pub last_cycle_time: Option<DateTime<Utc>>,
    pub total_cycles: u64,
    pub total_checks: u64,
}

/// State kept for one target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRecord {
    pub history: TargetHistory,
    pub breaker_state: BreakerState,
    pub last_check_time: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub total_failures: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_recovery_time: Option<DateTime<Utc>>,
}

/// Summary numbers for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub availability_pct: f64,
    pub total_checks: u64,
    pub total_failures: u64,
    /// Latency percentiles over retained history, nearest rank
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_recovery_time: Option<DateTime<Utc>>,
}

impl TargetRecord {
    /// Fold one result into history and counters.
    ///
    /// A passing result right after a failing one of the same kind marks a
    /// recovery.
    pub fn record(&mut self, result: &CheckResult, capacity: usize) {
        let previous_failed = self
            .history
            .last(result.kind)
            .is_some_and(CheckResult::is_failure);

        self.total_checks += 1;
        self.last_check_time = Some(result.timestamp);
        if result.is_failure() {
            self.total_failures += 1;
            self.last_failure_time = Some(result.timestamp);
        } else if previous_failed {
            self.last_recovery_time = Some(result.timestamp);
        }
        self.history.push(result.clone(), capacity);
    }

    pub fn statistics(&self) -> Statistics {
        let availability_pct = if self.total_checks == 0 {
            100.0
        } else {
            let passed = self.total_checks.saturating_sub(self.total_failures);
            passed as f64 / self.total_checks as f64 * 100.0
        };

        let mut latencies = self.history.latencies();
        latencies.sort_unstable();

        Statistics {
            availability_pct,
            total_checks: self.total_checks,
            total_failures: self.total_failures,
            p50_ms: percentile(&latencies, 50.0),
            p95_ms: percentile(&latencies, 95.0),
            p99_ms: percentile(&latencies, 99.0),
            last_failure_time: self.last_failure_time,
            last_recovery_time: self.last_recovery_time,
        }
    }
}

impl PersistedState {
    /// Record a result for its target, creating the target on first sight.
    pub fn record_result(&mut self, result: &CheckResult, capacity: usize) {
        self.global.total_checks += 1;
        self.targets
            .entry(result.target.clone())
            .or_default()
            .record(result, capacity);
    }

    pub fn set_breaker_state(&mut self, target: &str, state: BreakerState) {
        self.targets.entry(target.to_string()).or_default().breaker_state = state;
    }

    pub fn history(&self, target: &str, kind: CheckKind, limit: usize) -> Vec<CheckResult> {
        self.targets
            .get(target)
            .map(|record| record.history.recent(kind, limit))
            .unwrap_or_default()
    }

    pub fn statistics(&self, target: &str) -> Option<Statistics> {
        self.targets.get(target).map(TargetRecord::statistics)
    }

    pub fn breaker_state(&self, target: &str) -> Option<&BreakerState> {
        self.targets.get(target).map(|record| &record.breaker_state)
    }

    /// Enforce the history bound everywhere.
    pub fn trim(&mut self, capacity: usize) {
        for record in self.targets.values_mut() {
            record.history.trim(capacity);
        }
    }
}

/// Nearest-rank percentile of sorted values.
fn percentile(sorted: &[u64], pct: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckStatus;
    use std::time::Duration;

    fn result(status: CheckStatus, latency_ms: u64, minute: i64) -> CheckResult {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::minutes(minute);
        CheckResult::new(
            "A",
            CheckKind::Uptime,
            status,
            Duration::from_millis(latency_ms),
            at,
        )
    }

    #[test]
    fn test_statistics_empty_target() {
        let record = TargetRecord::default();
        let stats = record.statistics();
        assert_eq!(stats.availability_pct, 100.0);
        assert_eq!(stats.total_checks, 0);
        assert!(stats.p50_ms.is_none());
    }

    #[test]
    fn test_availability_counts_timeouts_as_failures() {
        let mut state = PersistedState::default();
        state.record_result(&result(CheckStatus::Success, 100, 0), 100);
        state.record_result(&result(CheckStatus::Warning, 100, 1), 100);
        state.record_result(&result(CheckStatus::Failure, 100, 2), 100);
        state.record_result(&result(CheckStatus::Timeout, 100, 3), 100);

        let stats = state.statistics("A").unwrap();
        assert_eq!(stats.total_checks, 4);
        assert_eq!(stats.total_failures, 2);
        assert_eq!(stats.availability_pct, 50.0);
        assert_eq!(state.global.total_checks, 4);
    }

    #[test]
    fn test_lifetime_totals_survive_history_eviction() {
        let mut state = PersistedState::default();
        for i in 0..10 {
            state.record_result(&result(CheckStatus::Failure, 10, i), 3);
        }
        let stats = state.statistics("A").unwrap();
        assert_eq!(stats.total_checks, 10);
        assert_eq!(stats.total_failures, 10);
        assert_eq!(state.history("A", CheckKind::Uptime, 100).len(), 3);
    }

    #[test]
    fn test_recovery_time_set_after_failure() {
        let mut state = PersistedState::default();
        let fail = result(CheckStatus::Failure, 10, 0);
        let ok = result(CheckStatus::Success, 10, 5);
        state.record_result(&fail, 100);
        state.record_result(&ok, 100);

        let stats = state.statistics("A").unwrap();
        assert_eq!(stats.last_failure_time, Some(fail.timestamp));
        assert_eq!(stats.last_recovery_time, Some(ok.timestamp));
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 50.0), Some(50));
        assert_eq!(percentile(&sorted, 95.0), Some(95));
        assert_eq!(percentile(&sorted, 99.0), Some(99));
        assert_eq!(percentile(&[7], 99.0), Some(7));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_unknown_target_queries() {
        let state = PersistedState::default();
        assert!(state.history("nope", CheckKind::Uptime, 10).is_empty());
        assert!(state.statistics("nope").is_none());
        assert!(state.breaker_state("nope").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored_and_missing_default() {
        let json = r#"{"targets": {"A": {"total_checks": 3, "future_field": 1}}, "extra": true}"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert_eq!(state.targets["A"].total_checks, 3);
        assert!(state.global.last_cycle_time.is_none());
    }
}
