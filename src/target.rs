//! Monitored target definitions.
//!
//! Targets are owned by the caller's configuration and passed by reference
//! into every check; nothing in the engine reads them from global state.

use crate::checks::CheckKind;
use serde::{Deserialize, Serialize};
use url::Url;

/// A monitored site and the checks enabled for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Unique name, used as the key for history and breaker state
    pub name: String,
    /// Base URL all endpoints are relative to
    pub url: String,
    /// Enabled check kinds
    #[serde(default = "default_checks")]
    pub checks: Vec<CheckKind>,
    /// Verify TLS certificates (disable only for self-signed hosts)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default)]
    pub uptime: UptimeParams,
    #[serde(default)]
    pub authentication: Option<SessionParams>,
    #[serde(default)]
    pub protected_resource: Option<ProtectedParams>,
}

fn default_checks() -> Vec<CheckKind> {
    vec![CheckKind::Uptime]
}

fn default_verify_tls() -> bool {
    true
}

impl Target {
    /// Create an uptime-only target with default parameters.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            checks: default_checks(),
            verify_tls: true,
            uptime: UptimeParams::default(),
            authentication: None,
            protected_resource: None,
        }
    }

    pub fn is_enabled(&self, kind: CheckKind) -> bool {
        self.checks.contains(&kind)
    }

    /// Join an endpoint path onto the base URL.
    ///
    /// The base path is kept: `https://host/app` + `/login` gives
    /// `https://host/app/login`.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, url::ParseError> {
        let base = self.url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }
}

/// Parameters for the uptime check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeParams {
    pub endpoints: Vec<String>,
    pub expected_status: Vec<u16>,
}

impl Default for UptimeParams {
    fn default() -> Self {
        Self {
            endpoints: vec!["/".to_string()],
            expected_status: vec![200, 301, 302],
        }
    }
}

/// Parameters for the authenticated-session check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
    /// Opaque key handed to the credential provider
    pub credential_key: String,
    /// Case-insensitive markers expected in the post-login page. When empty,
    /// a post-login page without a password field counts as logged in.
    #[serde(default)]
    pub success_markers: Vec<String>,
    /// Case-insensitive markers that mean the login was refused
    #[serde(default)]
    pub failure_markers: Vec<String>,
    /// Explicit username field name, bypassing form detection
    #[serde(default)]
    pub username_field: Option<String>,
    /// Explicit password field name, bypassing form detection
    #[serde(default)]
    pub password_field: Option<String>,
}

fn default_login_endpoint() -> String {
    "/".to_string()
}

/// Parameters for the protected-resource check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedParams {
    pub endpoint: String,
    #[serde(default)]
    pub expected_content: Vec<String>,
    #[serde(default = "default_protected_status")]
    pub expected_status: Vec<u16>,
}

fn default_protected_status() -> Vec<u16> {
    vec![200]
}
