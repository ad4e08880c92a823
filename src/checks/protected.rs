//! Protected-resource check: an authenticated request to an endpoint that
//! requires a live session.

use super::session::AuthenticationCheck;
use super::{
    error_result, latency_warning, record_latency, with_retry, CheckContext, CheckKind,
    CheckResult, CheckStatus, CheckStrategy,
};
use crate::executor::Request;
use crate::target::Target;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Requests a protected endpoint with the session established by the
/// authentication check, logging in first when no session exists.
#[derive(Debug, Clone)]
pub struct ProtectedResourceCheck {
    authentication: Arc<AuthenticationCheck>,
}

impl ProtectedResourceCheck {
    pub fn new(authentication: Arc<AuthenticationCheck>) -> Self {
        Self { authentication }
    }
}

impl Default for ProtectedResourceCheck {
    fn default() -> Self {
        Self::new(Arc::new(AuthenticationCheck::default()))
    }
}

#[async_trait]
impl CheckStrategy for ProtectedResourceCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::ProtectedResource
    }

    async fn check(&self, target: &Target, ctx: &CheckContext<'_>) -> CheckResult {
        let kind = self.kind();
        let timestamp = Utc::now();
        let started = Instant::now();

        let fail = |status: CheckStatus, detail: String| {
            warn!(target_name = %target.name, detail = %detail, "Protected resource check failed");
            CheckResult::new(&target.name, kind, status, started.elapsed(), timestamp)
                .with_detail(detail)
        };

        let Some(params) = target.protected_resource.as_ref() else {
            return fail(
                CheckStatus::Failure,
                "protected resource parameters not configured".to_string(),
            );
        };
        let url = match target.endpoint_url(&params.endpoint) {
            Ok(url) => url,
            Err(e) => return fail(CheckStatus::Failure, format!("invalid URL: {}", e)),
        };

        let jar = match ctx.sessions.get(&target.name) {
            Some(jar) => jar,
            None => {
                debug!(target_name = %target.name, "No session available, logging in");
                match self.authentication.login(target, ctx).await {
                    Ok(session) => {
                        ctx.sessions.insert(&target.name, Arc::clone(&session.jar));
                        session.jar
                    }
                    Err(failure) => {
                        return fail(
                            failure.status(),
                            format!("could not establish session: {}", failure),
                        )
                    }
                }
            }
        };

        let outcome = with_retry(ctx.settings, &target.name, kind, || {
            ctx.executor.execute(
                Request::get(url.clone())
                    .markup()
                    .verify_tls(target.verify_tls)
                    .session(Arc::clone(&jar)),
            )
        })
        .await;
        let latency = started.elapsed();
        record_latency(&target.name, kind, latency);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => return error_result(target, kind, &err, latency, timestamp),
        };

        let code = response.status;
        if code == 401 || code == 403 {
            // The session is no longer usable; the next cycle logs in again
            ctx.sessions.remove(&target.name);
            return fail(
                CheckStatus::Failure,
                format!("session expired or unauthorized (HTTP {})", code),
            )
            .with_status_code(code);
        }
        if !params.expected_status.contains(&code) {
            return fail(CheckStatus::Failure, format!("unexpected status code {}", code))
                .with_status_code(code);
        }

        let mut warnings = Vec::new();
        if !params.expected_content.is_empty() {
            let body = response.text().to_lowercase();
            let missing: Vec<&str> = params
                .expected_content
                .iter()
                .filter(|expected| !body.contains(&expected.to_lowercase()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                warnings.push(format!("expected content not found: {}", missing.join(", ")));
            }
        }
        if let Some(message) = latency_warning(ctx.settings, latency) {
            warnings.push(message);
        }

        let status = if warnings.is_empty() {
            CheckStatus::Success
        } else {
            CheckStatus::Warning
        };
        let mut result =
            CheckResult::new(&target.name, kind, status, latency, timestamp).with_status_code(code);
        if !warnings.is_empty() {
            result = result.with_detail(warnings.join("; "));
        }
        info!(
            target_name = %target.name,
            status = ?status,
            latency_ms = result.latency_ms,
            "Protected resource check completed"
        );
        result
    }
}
