//! Check engine: one monitoring cycle over a set of targets.
//!
//! The engine owns the executor, the per-target circuit breakers and the
//! in-memory state. Each call to [`CheckEngine::run_cycle`] checks every
//! admitted target concurrently, folds the results into breakers and
//! history, then persists a single snapshot. Scheduling cycles is left to
//! the caller.

mod error;


pub use error::EngineError;

use crate::breaker::{BreakerConfig, BreakerPhase, BreakerState, CircuitBreaker, Transition};
use crate::checks::{
    default_strategies, CheckContext, CheckKind, CheckResult, CheckSettings, CheckStrategy,
    CredentialProvider, SessionStore,
};
use crate::config::WatchConfig;
use crate::executor::GuardedExecutor;
use crate::guard::UrlValidator;
use crate::state::{PersistedState, StateStore, Statistics, StoreError};
use crate::target::Target;
use chrono::Utc;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A breaker transition together with the target it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTransition {
    pub target: String,
    pub transition: Transition,
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Every result produced, grouped by target in check order
    pub results: Vec<CheckResult>,
    /// Targets not checked because their breaker is open
    pub skipped: Vec<String>,
    pub transitions: Vec<TargetTransition>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}

enum TargetOutcome {
    Checked {
        results: Vec<CheckResult>,
        transitions: Vec<TargetTransition>,
    },
    Skipped(String),
}

/// Drives check cycles and owns all monitoring state.
pub struct CheckEngine {
    executor: Arc<GuardedExecutor>,
    /// Ordered by check kind, at most one per kind
    strategies: Vec<Arc<dyn CheckStrategy>>,
    breakers: DashMap<String, CircuitBreaker>,
    state: RwLock<PersistedState>,
    store: Arc<StateStore>,
    sessions: SessionStore,
    breaker_config: BreakerConfig,
    settings: CheckSettings,
    history_capacity: usize,
    /// Cycles never overlap, so snapshots reach disk in order
    cycle_lock: tokio::sync::Mutex<()>,
}

impl CheckEngine {
    /// Build an engine from configuration and load persisted state.
    pub fn new(config: &WatchConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let validator = Arc::new(UrlValidator::new(&config.guard));
        let executor = Arc::new(GuardedExecutor::new(config.http.clone(), validator)?);
        let store = Arc::new(StateStore::new(config.state.path.clone()));
        Ok(Self::with_parts(config, executor, store))
    }

    /// Build an engine around an existing executor and store.
    pub fn with_parts(
        config: &WatchConfig,
        executor: Arc<GuardedExecutor>,
        store: Arc<StateStore>,
    ) -> Self {
        let state = store.load();
        info!(
            path = %store.path().display(),
            targets = state.targets.len(),
            total_cycles = state.global.total_cycles,
            "Loaded monitoring state"
        );

        Self {
            executor,
            strategies: default_strategies(),
            breakers: DashMap::new(),
            state: RwLock::new(state),
            store,
            sessions: SessionStore::new(),
            breaker_config: config.breaker.clone(),
            settings: config.checks.clone(),
            history_capacity: config.state.history_capacity.max(1),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Install a strategy, replacing any existing one of the same kind.
    pub fn with_strategy(mut self, strategy: Arc<dyn CheckStrategy>) -> Self {
        let kind = strategy.kind();
        self.strategies.retain(|s| s.kind() != kind);
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.kind());
        self
    }

    pub fn executor(&self) -> &Arc<GuardedExecutor> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Run one cycle over `targets` and persist the outcome.
    ///
    /// Check failures are recorded, never returned. The only error is a
    /// failed persist; in-memory state is already updated when it happens,
    /// and the next successful cycle writes it out.
    pub async fn run_cycle(
        &self,
        targets: &[Target],
        credentials: &dyn CredentialProvider,
    ) -> Result<CycleReport, StoreError> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let mut seen = HashSet::new();
        let unique: Vec<&Target> = targets
            .iter()
            .filter(|target| {
                let first = seen.insert(target.name.as_str());
                if !first {
                    warn!(target_name = %target.name, "Duplicate target name, skipping");
                }
                first
            })
            .collect();

        let outcomes = join_all(
            unique
                .iter()
                .map(|target| self.run_target(target, credentials)),
        )
        .await;

        let mut report = CycleReport::default();
        for outcome in outcomes {
            match outcome {
                TargetOutcome::Checked {
                    results,
                    transitions,
                } => {
                    report.results.extend(results);
                    report.transitions.extend(transitions);
                }
                TargetOutcome::Skipped(name) => report.skipped.push(name),
            }
        }

        let snapshot = {
            let mut state = self.write_state();
            state.global.last_cycle_time = Some(Utc::now());
            state.global.total_cycles += 1;
            state.trim(self.history_capacity);
            state.clone()
        };
        self.persist(snapshot).await?;

        report.duration = started.elapsed();
        metrics::counter!("sitewatch_cycles_total").increment(1);
        info!(
            targets = unique.len(),
            checks = report.results.len(),
            failures = report.failures(),
            skipped = report.skipped.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Check cycle complete"
        );

        Ok(report)
    }

    async fn run_target(
        &self,
        target: &Target,
        credentials: &dyn CredentialProvider,
    ) -> TargetOutcome {
        let enabled: Vec<&Arc<dyn CheckStrategy>> = self
            .strategies
            .iter()
            .filter(|s| target.is_enabled(s.kind()))
            .collect();
        if enabled.is_empty() {
            warn!(target_name = %target.name, "No enabled checks, skipping");
            return TargetOutcome::Skipped(target.name.clone());
        }

        let (admitted, breaker_state) = {
            let mut breaker = self.breaker_for(&target.name);
            (breaker.should_attempt(Utc::now()), breaker.snapshot())
        };
        self.write_state()
            .set_breaker_state(&target.name, breaker_state);
        if !admitted {
            debug!(target_name = %target.name, "Circuit open, skipping target");
            metrics::counter!("sitewatch_targets_skipped_total").increment(1);
            return TargetOutcome::Skipped(target.name.clone());
        }

        // Sessions never outlive the cycle that created them
        self.sessions.remove(&target.name);

        let ctx = CheckContext {
            executor: &self.executor,
            credentials,
            sessions: &self.sessions,
            settings: &self.settings,
        };

        let mut results = Vec::with_capacity(enabled.len());
        let mut transitions = Vec::new();
        let mut login_failed = false;

        for strategy in enabled {
            let kind = strategy.kind();
            if kind == CheckKind::ProtectedResource && login_failed {
                debug!(
                    target_name = %target.name,
                    "Login failed this cycle, skipping protected resource check"
                );
                continue;
            }

            let result = strategy.check(target, &ctx).await;
            if kind == CheckKind::Authentication && result.is_failure() {
                login_failed = true;
            }

            let transition = self.apply(&result);
            results.push(result);
            if let Some(transition) = transition {
                transitions.push(TargetTransition {
                    target: target.name.clone(),
                    transition,
                });
                // An open circuit sends no more traffic, even within this cycle
                if transition.to == BreakerPhase::Open {
                    debug!(
                        target_name = %target.name,
                        "Circuit opened, skipping remaining checks"
                    );
                    break;
                }
            }
        }

        self.sessions.remove(&target.name);
        TargetOutcome::Checked {
            results,
            transitions,
        }
    }

    /// Fold one result into the breaker, then into state.
    ///
    /// Lock order is breaker entry first, state second; the breaker guard is
    /// released before the state lock is taken.
    fn apply(&self, result: &CheckResult) -> Option<Transition> {
        let (transition, breaker_state) = {
            let mut breaker = self.breaker_for(&result.target);
            (breaker.record(result, Utc::now()), breaker.snapshot())
        };

        let mut state = self.write_state();
        state.record_result(result, self.history_capacity);
        state.set_breaker_state(&result.target, breaker_state);
        transition
    }

    fn breaker_for(&self, target: &str) -> RefMut<'_, String, CircuitBreaker> {
        self.breakers.entry(target.to_string()).or_insert_with(|| {
            let persisted = self
                .read_state()
                .breaker_state(target)
                .cloned()
                .unwrap_or_default();
            CircuitBreaker::restore(target, self.breaker_config.clone(), persisted)
        })
    }

    async fn persist(&self, snapshot: PersistedState) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.persist(&snapshot))
            .await
            .map_err(|e| StoreError::Persist {
                path: self.store.path().to_path_buf(),
                attempts: 0,
                message: format!("persist task failed: {}", e),
            })?
    }

    /// Up to `limit` most recent results for one target and kind, most recent last.
    pub fn get_history(&self, target: &str, kind: CheckKind, limit: usize) -> Vec<CheckResult> {
        self.read_state().history(target, kind, limit)
    }

    pub fn get_statistics(&self, target: &str) -> Option<Statistics> {
        self.read_state().statistics(target)
    }

    /// Current breaker state, live if the target has been seen this run.
    pub fn get_breaker_state(&self, target: &str) -> Option<BreakerState> {
        self.breakers
            .get(target)
            .map(|breaker| breaker.snapshot())
            .or_else(|| self.read_state().breaker_state(target).cloned())
    }

    /// A copy of the full in-memory state.
    pub fn snapshot(&self) -> PersistedState {
        self.read_state().clone()
    }

    /// Close the executor; later checks fail with `Closed`.
    pub fn shutdown(&self) {
        info!("Check engine shutting down");
        self.executor.shutdown();
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PersistedState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PersistedState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
