//! Sitewatch - safe-checking engine for website monitors
//!
//! This library runs uptime, login and protected-resource checks against
//! configured sites without ever letting a request reach a private,
//! loopback or cloud-metadata address. Repeated failures trip a per-target
//! circuit breaker, and all history is persisted crash-safely between runs.
//!
//! ```no_run
//! use sitewatch::checks::EnvCredentials;
//! use sitewatch::config::WatchConfig;
//! use sitewatch::engine::CheckEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WatchConfig::load(Some("sitewatch.toml".as_ref()))?.with_env_overrides();
//! sitewatch::logging::init_tracing(&config.logging)?;
//!
//! let engine = CheckEngine::new(&config)?;
//! let report = engine
//!     .run_cycle(&config.targets, &EnvCredentials::new())
//!     .await?;
//! println!("{} checks, {} failures", report.results.len(), report.failures());
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod checks;
pub mod config;
pub mod engine;
pub mod executor;
pub mod guard;
pub mod logging;
pub mod state;
pub mod target;

pub use checks::{CheckKind, CheckResult, CheckStatus};
pub use config::WatchConfig;
pub use engine::{CheckEngine, CycleReport};
pub use target::Target;
