//! Configuration for the state store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of results kept per (target, check kind).
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Snapshot file; its directory also holds the temporary files
    pub path: PathBuf,
    pub history_capacity: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/monitor_state.json"),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}
