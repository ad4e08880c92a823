//! Authenticated-session check: fetch the login form, submit credentials and
//! keep the resulting cookies for the protected-resource check.

use super::credentials::LoginCredentials;
use super::form::{self, LoginFields, LoginFormDetector};
use super::{
    error_result, latency_warning, record_latency, with_retry, CheckContext, CheckKind,
    CheckResult, CheckStatus, CheckStrategy,
};
use crate::executor::{ExecutorError, GuardedExecutor, Request, Response};
use crate::target::{SessionParams, Target};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderValue, ORIGIN, REFERER};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Cookie jars of logged-in sessions, keyed by target name.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Jar>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &str) -> Option<Arc<Jar>> {
        self.sessions.get(target).map(|jar| Arc::clone(jar.value()))
    }

    pub fn insert(&self, target: &str, jar: Arc<Jar>) {
        self.sessions.insert(target.to_string(), jar);
    }

    pub fn remove(&self, target: &str) {
        self.sessions.remove(target);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Why a login did not produce a session.
#[derive(Debug, Clone, Error)]
pub(crate) enum LoginFailure {
    #[error("authentication parameters not configured")]
    NotConfigured,

    #[error("credentials not configured for key '{0}'")]
    MissingCredentials(String),

    #[error("invalid login URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Request(ExecutorError),

    #[error("failed to load login page: HTTP {0}")]
    LoginPage(u16),

    #[error("{message}")]
    Refused { status_code: u16, message: String },
}

impl LoginFailure {
    pub(crate) fn status(&self) -> CheckStatus {
        match self {
            LoginFailure::Request(err) if err.is_timeout() => CheckStatus::Timeout,
            _ => CheckStatus::Failure,
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            LoginFailure::LoginPage(code) => Some(*code),
            LoginFailure::Refused { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// A logged-in session.
pub(crate) struct Session {
    pub jar: Arc<Jar>,
    pub status_code: u16,
    pub markers_found: Vec<String>,
}

/// Outcome of one login round trip, before success is judged.
enum Submission {
    PageUnavailable(u16),
    Submitted { response: Response, jar: Arc<Jar> },
}

/// Logs in through the target's login form.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationCheck {
    detector: LoginFormDetector,
}

impl AuthenticationCheck {
    pub fn new(detector: LoginFormDetector) -> Self {
        Self { detector }
    }

    /// Perform a full login. Transient errors are retried as a whole flow.
    pub(crate) async fn login(
        &self,
        target: &Target,
        ctx: &CheckContext<'_>,
    ) -> Result<Session, LoginFailure> {
        let params = target
            .authentication
            .as_ref()
            .ok_or(LoginFailure::NotConfigured)?;
        // No network I/O happens without credentials
        let credentials = LoginCredentials::lookup(ctx.credentials, &params.credential_key)
            .ok_or_else(|| LoginFailure::MissingCredentials(params.credential_key.clone()))?;
        let login_url = target
            .endpoint_url(&params.login_endpoint)
            .map_err(|e| LoginFailure::InvalidUrl(e.to_string()))?;

        let submission = with_retry(ctx.settings, &target.name, CheckKind::Authentication, || {
            self.submit(ctx.executor, target, params, &credentials, &login_url)
        })
        .await
        .map_err(LoginFailure::Request)?;

        match submission {
            Submission::PageUnavailable(code) => Err(LoginFailure::LoginPage(code)),
            Submission::Submitted { response, jar } => judge(params, response, jar),
        }
    }

    async fn submit(
        &self,
        executor: &GuardedExecutor,
        target: &Target,
        params: &SessionParams,
        credentials: &LoginCredentials,
        login_url: &Url,
    ) -> Result<Submission, ExecutorError> {
        let jar = Arc::new(Jar::default());
        let page = executor
            .execute(
                Request::get(login_url.clone())
                    .markup()
                    .verify_tls(target.verify_tls)
                    .session(Arc::clone(&jar)),
            )
            .await?;
        if page.status != 200 {
            return Ok(Submission::PageUnavailable(page.status));
        }

        let html = page.text();
        let inputs = form::parse_inputs(&html);
        let mut fields = form::anti_forgery_tokens(&html, &inputs);
        let LoginFields {
            username,
            password,
            submit,
        } = self.login_fields(target, params, &inputs);

        fields.push((username, credentials.username.clone()));
        fields.push((password, credentials.password.clone()));
        if let Some(submit) = submit {
            fields.push(submit);
        }

        let post_url = page.final_url.clone();
        let mut request = Request::post_form(post_url.clone(), &fields)
            .markup()
            .verify_tls(target.verify_tls)
            .session(Arc::clone(&jar));
        if let Ok(referer) = HeaderValue::from_str(post_url.as_str()) {
            request = request.header(REFERER, referer);
        }
        if let Ok(origin) = HeaderValue::from_str(&post_url.origin().ascii_serialization()) {
            request = request.header(ORIGIN, origin);
        }

        debug!(target_name = %target.name, fields = fields.len(), "Submitting login form");
        let response = executor.execute(request).await?;
        Ok(Submission::Submitted { response, jar })
    }

    fn login_fields(
        &self,
        target: &Target,
        params: &SessionParams,
        inputs: &[form::FormField],
    ) -> LoginFields {
        let detection = self.detector.detect(inputs);
        if detection.is_fallback() {
            warn!(
                target_name = %target.name,
                "Login fields not detected, using fallback names"
            );
        }
        let mut fields = detection.into_fields();
        if let Some(name) = &params.username_field {
            fields.username = name.clone();
        }
        if let Some(name) = &params.password_field {
            fields.password = name.clone();
        }
        fields
    }
}

/// Decide whether the post-login page shows a logged-in session.
fn judge(
    params: &SessionParams,
    response: Response,
    jar: Arc<Jar>,
) -> Result<Session, LoginFailure> {
    let status_code = response.status;
    if !(200..300).contains(&status_code) {
        return Err(LoginFailure::Refused {
            status_code,
            message: format!("login returned HTTP {}", status_code),
        });
    }

    let page = response.text();
    let lowered = page.to_lowercase();
    let failures: Vec<&String> = params
        .failure_markers
        .iter()
        .filter(|m| lowered.contains(&m.to_lowercase()))
        .collect();
    if !failures.is_empty() {
        return Err(LoginFailure::Refused {
            status_code,
            message: format!(
                "login failed, found failure markers: {}",
                failures
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }

    let markers_found: Vec<String> = params
        .success_markers
        .iter()
        .filter(|m| lowered.contains(&m.to_lowercase()))
        .cloned()
        .collect();

    let logged_in = if params.success_markers.is_empty() {
        !form::parse_inputs(&page)
            .iter()
            .any(|field| field.input_type == "password")
    } else {
        !markers_found.is_empty()
    };

    if !logged_in {
        return Err(LoginFailure::Refused {
            status_code,
            message: "login result unclear, no success markers found".to_string(),
        });
    }

    Ok(Session {
        jar,
        status_code,
        markers_found,
    })
}

#[async_trait]
impl CheckStrategy for AuthenticationCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Authentication
    }

    async fn check(&self, target: &Target, ctx: &CheckContext<'_>) -> CheckResult {
        let timestamp = Utc::now();
        let started = Instant::now();
        let outcome = self.login(target, ctx).await;
        let latency = started.elapsed();
        record_latency(&target.name, self.kind(), latency);

        match outcome {
            Ok(session) => {
                ctx.sessions.insert(&target.name, Arc::clone(&session.jar));
                let mut result = CheckResult::new(
                    &target.name,
                    self.kind(),
                    CheckStatus::Success,
                    latency,
                    timestamp,
                )
                .with_status_code(session.status_code);
                if let Some(message) = latency_warning(ctx.settings, latency) {
                    result.status = CheckStatus::Warning;
                    result = result.with_detail(message);
                }
                info!(
                    target_name = %target.name,
                    latency_ms = result.latency_ms,
                    markers = ?session.markers_found,
                    "Authentication successful"
                );
                result
            }
            Err(LoginFailure::Request(err)) => {
                error_result(target, self.kind(), &err, latency, timestamp)
            }
            Err(failure) => {
                warn!(
                    target_name = %target.name,
                    error = %failure,
                    "Authentication failed"
                );
                let mut result =
                    CheckResult::new(&target.name, self.kind(), failure.status(), latency, timestamp)
                        .with_detail(failure.to_string());
                if let Some(code) = failure.status_code() {
                    result = result.with_status_code(code);
                }
                result
            }
        }
    }
}
