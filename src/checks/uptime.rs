//! Uptime check: every configured endpoint must answer with an expected status.

use super::{
    latency_warning, record_latency, with_retry, CheckContext, CheckKind, CheckResult,
    CheckStatus, CheckStrategy,
};
use crate::executor::Request;
use crate::target::Target;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;
use tracing::{info, warn};

/// Checks that each endpoint responds with one of the expected status codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UptimeCheck;

#[async_trait]
impl CheckStrategy for UptimeCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Uptime
    }

    async fn check(&self, target: &Target, ctx: &CheckContext<'_>) -> CheckResult {
        let timestamp = Utc::now();
        let started = Instant::now();
        let params = &target.uptime;
        let default_endpoints = ["/".to_string()];
        let endpoints: &[String] = if params.endpoints.is_empty() {
            &default_endpoints
        } else {
            &params.endpoints
        };

        let mut status = CheckStatus::Success;
        let mut status_code = None;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for endpoint in endpoints {
            let url = match target.endpoint_url(endpoint) {
                Ok(url) => url,
                Err(e) => {
                    status = status.worst(CheckStatus::Failure);
                    errors.push(format!("invalid URL for {}: {}", endpoint, e));
                    continue;
                }
            };

            let outcome = with_retry(ctx.settings, &target.name, self.kind(), || {
                ctx.executor
                    .execute(Request::get(url.clone()).verify_tls(target.verify_tls))
            })
            .await;

            match outcome {
                Ok(response) => {
                    status_code = Some(response.status);
                    if !params.expected_status.contains(&response.status) {
                        status = status.worst(CheckStatus::Failure);
                        errors.push(format!(
                            "unexpected status code {} for {}",
                            response.status, endpoint
                        ));
                    } else if let Some(message) = latency_warning(ctx.settings, response.elapsed) {
                        warnings.push(format!("{} ({})", message, endpoint));
                    }
                }
                Err(err) => {
                    let failure = if err.is_timeout() {
                        CheckStatus::Timeout
                    } else {
                        CheckStatus::Failure
                    };
                    status = status.worst(failure);
                    errors.push(format!("{}: {}", endpoint, err));
                }
            }
        }

        if status == CheckStatus::Success && !warnings.is_empty() {
            status = CheckStatus::Warning;
        }

        let latency = started.elapsed();
        record_latency(&target.name, self.kind(), latency);

        let mut result = CheckResult::new(&target.name, self.kind(), status, latency, timestamp);
        if let Some(code) = status_code {
            result = result.with_status_code(code);
        }
        let detail: Vec<String> = errors.into_iter().chain(warnings).collect();
        if !detail.is_empty() {
            result = result.with_detail(crate::logging::sanitize_log_message(&detail.join("; ")));
        }

        match status {
            CheckStatus::Success => info!(
                target_name = %target.name,
                latency_ms = result.latency_ms,
                "Uptime check passed"
            ),
            _ => warn!(
                target_name = %target.name,
                status = ?status,
                detail = result.detail.as_deref().unwrap_or_default(),
                "Uptime check did not pass"
            ),
        }
        result
    }
}
