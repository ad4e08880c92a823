//! Configuration for the request guard.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Outbound address policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Networks exempted from the blocked ranges (e.g. a monitored intranet
    /// host). Cloud metadata endpoints stay blocked regardless.
    pub allowed_networks: Vec<IpNet>,
    /// Extra hostnames refused before resolution, on top of the built-in list
    pub blocked_hostnames: Vec<String>,
}
