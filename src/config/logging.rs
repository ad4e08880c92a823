//! The `[logging]` section.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

/// Modules that accept their own level under `[logging.component_levels]`.
pub const LOG_COMPONENTS: &[&str] = &[
    "breaker", "checks", "config", "engine", "executor", "guard", "logging", "state",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::invalid(
                "logging.format",
                format!("unknown format '{}', expected pretty or json", other),
            )),
        }
    }
}

/// Base level, output format and per-component overrides.
///
/// `RUST_LOG`, when set, replaces all of this at subscriber init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Component name to level, e.g. `guard = "debug"`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub component_levels: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Reject levels tracing cannot parse and components this crate does not have.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_level("logging.level", &self.level)?;
        for (component, level) in &self.component_levels {
            let field = format!("logging.component_levels.{}", component);
            if !LOG_COMPONENTS.contains(&component.as_str()) {
                return Err(ConfigError::invalid(
                    field,
                    format!("unknown component, expected one of {}", LOG_COMPONENTS.join(", ")),
                ));
            }
            parse_level(&field, level)?;
        }
        Ok(())
    }
}

fn parse_level(field: &str, level: &str) -> Result<LevelFilter, ConfigError> {
    LevelFilter::from_str(level.trim())
        .map_err(|_| ConfigError::invalid(field, format!("'{}' is not a log level", level)))
}
