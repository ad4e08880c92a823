//! Shared helpers for sitewatch integration tests.
//!
//! Mock servers bind to 127.0.0.1, which the request guard refuses by
//! default; most helpers build a guard that allows the loopback range.

#![allow(dead_code)]

use sitewatch::checks::CheckSettings;
use sitewatch::executor::{GuardedExecutor, HttpConfig};
use sitewatch::guard::{GuardConfig, UrlValidator};
use sitewatch::target::{ProtectedParams, SessionParams, Target};
use std::sync::Arc;

/// Guard config that lets requests reach local mock servers.
pub fn loopback_guard() -> GuardConfig {
    GuardConfig {
        allowed_networks: vec!["127.0.0.0/8".parse().unwrap()],
        blocked_hostnames: vec![],
    }
}

pub fn executor_with(guard: &GuardConfig, http: HttpConfig) -> GuardedExecutor {
    GuardedExecutor::new(http, Arc::new(UrlValidator::new(guard))).unwrap()
}

/// Executor with default limits and loopback allowed.
pub fn loopback_executor() -> GuardedExecutor {
    executor_with(&loopback_guard(), HttpConfig::default())
}

/// Single attempt, short thresholds; keeps failing tests fast.
pub fn fast_settings() -> CheckSettings {
    CheckSettings {
        max_attempts: 1,
        retry_backoff_ms: 10,
        warning_latency_ms: 3000,
        critical_latency_ms: 10000,
    }
}

pub fn login_target(name: &str, base_url: &str) -> Target {
    let mut target = Target::new(name, base_url);
    target.checks = sitewatch::CheckKind::ALL.to_vec();
    target.authentication = Some(SessionParams {
        login_endpoint: "/login".to_string(),
        credential_key: "portal".to_string(),
        success_markers: vec!["Sign out".to_string()],
        failure_markers: vec!["Invalid password".to_string()],
        username_field: None,
        password_field: None,
    });
    target.protected_resource = Some(ProtectedParams {
        endpoint: "/account/alerts".to_string(),
        expected_content: vec!["alerts".to_string()],
        expected_status: vec![200],
    });
    target
}

/// A login page with an anti-forgery token and a submit button.
pub const LOGIN_PAGE: &str = r#"<html><body>
<form method="post" action="/login">
  <input type="hidden" name="csrf_token" value="tok123">
  <input type="text" name="username">
  <input type="password" name="password">
  <input type="submit" name="btnLogin" value="Sign in">
</form>
</body></html>"#;
