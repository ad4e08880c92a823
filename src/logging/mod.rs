//! Logging setup and log-safety helpers.
//!
//! Everything user-controlled or secret-bearing (credentials, URLs with
//! userinfo, response snippets) goes through [`sanitize`] before it is logged
//! or stored in a check result.

pub mod sanitize;

pub use sanitize::{mask_secret, redact_url_credentials, sanitize_log_message};

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build filter directives string from LoggingConfig
///
/// Produces the base level followed by one `sitewatch::<component>=<level>`
/// directive per configured component.
///
/// # Examples
///
/// ```
/// use sitewatch::config::LoggingConfig;
/// use sitewatch::logging::build_filter_directives;
/// use std::collections::BTreeMap;
///
/// let mut component_levels = BTreeMap::new();
/// component_levels.insert("guard".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     component_levels,
///     ..Default::default()
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,sitewatch::guard=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();
    for (component, level) in &config.component_levels {
        filter_str.push_str(&format!(",sitewatch::{}={}", component, level));
    }
    filter_str
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured directives. Fails if a
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}
