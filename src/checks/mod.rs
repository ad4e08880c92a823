//! Check strategies.
//!
//! Each check kind implements [`CheckStrategy`] and turns whatever happens
//! during the check (HTTP errors, guard rejections, missing credentials) into
//! a [`CheckResult`]. Strategies never return errors to the engine.

mod config;
pub mod credentials;
pub mod form;
mod protected;
mod session;
mod types;
mod uptime;

pub use config::CheckSettings;
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};
pub use protected::ProtectedResourceCheck;
pub use session::{AuthenticationCheck, SessionStore};
pub use types::{CheckKind, CheckResult, CheckStatus};
pub use uptime::UptimeCheck;

use crate::executor::{ExecutorError, GuardedExecutor};
use crate::target::Target;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything a strategy needs besides the target.
pub struct CheckContext<'a> {
    pub executor: &'a GuardedExecutor,
    pub credentials: &'a dyn CredentialProvider,
    pub sessions: &'a SessionStore,
    pub settings: &'a CheckSettings,
}

/// A single kind of check.
///
/// Object-safe; the engine holds strategies as `Arc<dyn CheckStrategy>`.
#[async_trait]
pub trait CheckStrategy: Send + Sync + 'static {
    fn kind(&self) -> CheckKind;

    /// Run the check. Always produces a result.
    async fn check(&self, target: &Target, ctx: &CheckContext<'_>) -> CheckResult;
}

/// The built-in strategies in execution order.
pub fn default_strategies() -> Vec<Arc<dyn CheckStrategy>> {
    let authentication = Arc::new(AuthenticationCheck::default());
    vec![
        Arc::new(UptimeCheck),
        authentication.clone(),
        Arc::new(ProtectedResourceCheck::new(authentication)),
    ]
}

/// Run `op`, retrying transient errors with exponential backoff.
///
/// Guard rejections, size and redirect limits are returned immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    settings: &CheckSettings,
    target: &str,
    kind: CheckKind,
    mut op: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecutorError>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = settings.backoff(attempt);
                debug!(
                    target_name = %target,
                    check = %kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Result for a check that ended in an executor error.
pub(crate) fn error_result(
    target: &Target,
    kind: CheckKind,
    err: &ExecutorError,
    latency: Duration,
    timestamp: DateTime<Utc>,
) -> CheckResult {
    let status = if err.is_timeout() {
        CheckStatus::Timeout
    } else {
        CheckStatus::Failure
    };
    warn!(
        target_name = %target.name,
        check = %kind,
        error = %err,
        "Check failed"
    );
    CheckResult::new(&target.name, kind, status, latency, timestamp)
        .with_detail(crate::logging::sanitize_log_message(&err.to_string()))
}

/// Downgrade a passing result to a warning when it was slow.
pub(crate) fn latency_warning(settings: &CheckSettings, latency: Duration) -> Option<String> {
    let ms = latency.as_millis() as u64;
    if ms > settings.critical_latency_ms {
        Some(format!(
            "Critical: response time {}ms exceeds {}ms",
            ms, settings.critical_latency_ms
        ))
    } else if ms > settings.warning_latency_ms {
        Some(format!(
            "Slow response: {}ms exceeds {}ms",
            ms, settings.warning_latency_ms
        ))
    } else {
        None
    }
}

pub(crate) fn record_latency(target: &str, kind: CheckKind, latency: Duration) {
    metrics::histogram!(
        "sitewatch_check_latency_seconds",
        "target" => target.to_string(),
        "check" => kind.as_str()
    )
    .record(latency.as_secs_f64());
}
