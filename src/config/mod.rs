//! Configuration module for sitewatch
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`SITEWATCH_*`)
//! 2. Configuration file (TOML)
//! 3. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use sitewatch::config::WatchConfig;
//!
//! let config = WatchConfig::default();
//! assert_eq!(config.breaker.failure_threshold, 5);
//!
//! let toml = r#"
//! [http]
//! timeout_seconds = 10
//! "#;
//! let config: WatchConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.http.timeout_seconds, 10);
//! assert_eq!(config.http.max_redirects, 5);
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

// Component configs live with their components
pub use crate::breaker::BreakerConfig;
pub use crate::checks::CheckSettings;
pub use crate::executor::HttpConfig;
pub use crate::guard::GuardConfig;
pub use crate::state::StateConfig;

use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Unified configuration for the checking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WatchConfig {
    /// Outbound address policy
    pub guard: GuardConfig,
    /// HTTP client limits
    pub http: HttpConfig,
    /// Circuit breaker thresholds
    pub breaker: BreakerConfig,
    /// Retry and latency thresholds
    pub checks: CheckSettings,
    /// State file location and history size
    pub state: StateConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Monitored targets
    pub targets: Vec<Target>,
}

impl WatchConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: p.to_path_buf(),
                    message: e.message().to_string(),
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports SITEWATCH_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("SITEWATCH_STATE_PATH") {
            if !path.is_empty() {
                self.state.path = path.into();
            }
        }

        if let Ok(level) = std::env::var("SITEWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SITEWATCH_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(timeout) = std::env::var("SITEWATCH_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.http.timeout_seconds = t;
            }
        }
        if let Ok(threshold) = std::env::var("SITEWATCH_FAILURE_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.breaker.failure_threshold = t;
            }
        }
        if let Ok(recovery) = std::env::var("SITEWATCH_RECOVERY_TIMEOUT_SECONDS") {
            if let Ok(r) = recovery.parse() {
                self.breaker.recovery_timeout_seconds = r;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "http.timeout_seconds",
                "timeout must be non-zero",
            ));
        }
        if self.http.max_body_bytes == 0 || self.http.max_markup_bytes == 0 {
            return Err(ConfigError::invalid(
                "http.max_body_bytes",
                "body limits must be non-zero",
            ));
        }
        if self.http.max_markup_bytes > self.http.max_body_bytes {
            return Err(ConfigError::invalid(
                "http.max_markup_bytes",
                "markup limit cannot exceed the general body limit",
            ));
        }
        if self.http.max_connections == 0 || self.http.max_connections_per_host == 0 {
            return Err(ConfigError::invalid(
                "http.max_connections",
                "connection limits must be non-zero",
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "breaker.failure_threshold",
                "threshold must be at least 1",
            ));
        }
        if self.breaker.recovery_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "breaker.recovery_timeout_seconds",
                "recovery timeout must be non-zero",
            ));
        }
        if self.checks.max_attempts == 0 || self.checks.max_attempts > 10 {
            return Err(ConfigError::invalid(
                "checks.max_attempts",
                "attempts must be between 1 and 10",
            ));
        }
        if self.checks.warning_latency_ms > self.checks.critical_latency_ms {
            return Err(ConfigError::invalid(
                "checks.warning_latency_ms",
                "warning threshold cannot exceed the critical threshold",
            ));
        }
        if self.state.history_capacity == 0 {
            return Err(ConfigError::invalid(
                "state.history_capacity",
                "capacity must be at least 1",
            ));
        }
        if self.state.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("state.path", "path cannot be empty"));
        }
        self.logging.validate()?;

        validate_targets(&self.targets)
    }
}

/// Validate target definitions.
///
/// Shape only: the request guard still checks every URL at request time.
pub fn validate_targets(targets: &[Target]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for (i, target) in targets.iter().enumerate() {
        let field = |name: &str| format!("targets[{}].{}", i, name);

        if target.name.trim().is_empty() {
            return Err(ConfigError::invalid(field("name"), "name cannot be empty"));
        }
        if !names.insert(target.name.as_str()) {
            return Err(ConfigError::invalid(
                field("name"),
                format!("duplicate target name '{}'", target.name),
            ));
        }

        let url = Url::parse(&target.url)
            .map_err(|e| ConfigError::invalid(field("url"), format!("invalid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                field("url"),
                "scheme must be http or https",
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid(field("url"), "URL must have a host"));
        }

        if target.checks.is_empty() {
            return Err(ConfigError::invalid(
                field("checks"),
                "at least one check must be enabled",
            ));
        }
        if target.is_enabled(crate::checks::CheckKind::Authentication)
            && target.authentication.is_none()
        {
            return Err(ConfigError::invalid(
                field("authentication"),
                "authentication check enabled without parameters",
            ));
        }
        if let Some(auth) = &target.authentication {
            if auth.credential_key.trim().is_empty() {
                return Err(ConfigError::invalid(
                    field("authentication.credential_key"),
                    "credential key cannot be empty",
                ));
            }
        }
        if target.is_enabled(crate::checks::CheckKind::ProtectedResource) {
            if target.protected_resource.is_none() {
                return Err(ConfigError::invalid(
                    field("protected_resource"),
                    "protected resource check enabled without parameters",
                ));
            }
            if target.authentication.is_none() {
                return Err(ConfigError::invalid(
                    field("authentication"),
                    "protected resource check needs authentication parameters",
                ));
            }
        }
    }
    Ok(())
}
