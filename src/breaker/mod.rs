//! Per-target circuit breaker.
//!
//! CLOSED counts consecutive failures and opens at the threshold. OPEN skips
//! checks until the recovery timeout has elapsed, then the next
//! [`CircuitBreaker::should_attempt`] moves to HALF_OPEN and admits a single
//! trial check. Its result closes the breaker or reopens it with a fresh
//! timeout, so an open breaker always recovers on its own.

#[cfg(test)]
mod tests;

use crate::checks::CheckResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Seconds an open breaker waits before admitting a trial check
    pub recovery_timeout_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_seconds: 30 * 60,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        // Clamped far below chrono's range limit
        Duration::seconds(self.recovery_timeout_seconds.min(1 << 40) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPhase {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl BreakerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerPhase::Closed => "closed",
            BreakerPhase::Open => "open",
            BreakerPhase::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted breaker state. Only [`CircuitBreaker`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    pub fn phase(&self) -> BreakerPhase {
        self.phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }
}

/// A phase change, returned so callers can notify or count it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerPhase,
    pub to: BreakerPhase,
    pub reason: &'static str,
}

/// State machine guarding one target.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    target: String,
    config: BreakerConfig,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: BreakerConfig) -> Self {
        Self::restore(target, config, BreakerState::default())
    }

    /// Rebuild a breaker from persisted state.
    ///
    /// A persisted HALF_OPEN (the process stopped mid-trial) resumes as OPEN
    /// with its original `opened_at`, so the trial is admitted again on the
    /// next cycle. The failure count of an open breaker is raised to the
    /// current threshold if the threshold grew since the state was written.
    pub fn restore(target: impl Into<String>, config: BreakerConfig, mut state: BreakerState) -> Self {
        if state.phase == BreakerPhase::HalfOpen {
            state.phase = BreakerPhase::Open;
        }
        if state.phase == BreakerPhase::Open {
            state.consecutive_failures = state.consecutive_failures.max(config.failure_threshold);
        }
        Self {
            target: target.into(),
            config,
            state,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn phase(&self) -> BreakerPhase {
        self.state.phase
    }

    pub fn state(&self) -> &BreakerState {
        &self.state
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> BreakerState {
        self.state.clone()
    }

    /// Whether the target should be checked now.
    ///
    /// An OPEN breaker whose recovery timeout has elapsed moves to HALF_OPEN
    /// and returns true once; further calls return false until a result is
    /// recorded.
    pub fn should_attempt(&mut self, now: DateTime<Utc>) -> bool {
        match self.state.phase {
            BreakerPhase::Closed => true,
            BreakerPhase::HalfOpen => false,
            BreakerPhase::Open => {
                let elapsed = self
                    .state
                    .opened_at
                    .map(|opened| now - opened >= self.config.recovery_timeout())
                    // Open without a timestamp cannot be timed; retry right away
                    .unwrap_or(true);
                if elapsed {
                    self.transition(BreakerPhase::HalfOpen, "recovery_timeout_elapsed");
                }
                elapsed
            }
        }
    }

    /// Apply a check result. Returns the transition it caused, if any.
    pub fn record(&mut self, result: &CheckResult, now: DateTime<Utc>) -> Option<Transition> {
        match (self.state.phase, result.is_failure()) {
            // Results are only produced for admitted cycles
            (BreakerPhase::Open, _) => None,
            (BreakerPhase::Closed, true) => {
                self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
                self.state.last_failure_at = Some(now);
                if self.state.consecutive_failures >= self.config.failure_threshold {
                    self.state.opened_at = Some(now);
                    Some(self.transition(BreakerPhase::Open, "failure_threshold_reached"))
                } else {
                    None
                }
            }
            (BreakerPhase::HalfOpen, true) => {
                self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
                self.state.last_failure_at = Some(now);
                self.state.opened_at = Some(now);
                Some(self.transition(BreakerPhase::Open, "trial_failed"))
            }
            (BreakerPhase::Closed, false) => {
                self.state.consecutive_failures = 0;
                None
            }
            (BreakerPhase::HalfOpen, false) => {
                self.state.consecutive_failures = 0;
                self.state.opened_at = None;
                Some(self.transition(BreakerPhase::Closed, "trial_succeeded"))
            }
        }
    }

    fn transition(&mut self, to: BreakerPhase, reason: &'static str) -> Transition {
        let from = self.state.phase;
        self.state.phase = to;
        info!(
            event = "circuit_transition",
            target_name = %self.target,
            from = %from,
            to = %to,
            reason = reason,
            failures = self.state.consecutive_failures
        );
        metrics::counter!(
            "sitewatch_breaker_transitions_total",
            "target" => self.target.clone(),
            "to" => to.as_str()
        )
        .increment(1);
        Transition { from, to, reason }
    }
}
