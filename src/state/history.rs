//! Bounded per-kind result history.

use crate::checks::{CheckKind, CheckResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Recent results of one target, oldest first, one ring buffer per check kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetHistory {
    entries: BTreeMap<CheckKind, VecDeque<CheckResult>>,
}

impl TargetHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result, evicting the oldest entries beyond `capacity`.
    pub fn push(&mut self, result: CheckResult, capacity: usize) {
        let entries = self.entries.entry(result.kind).or_default();
        entries.push_back(result);
        while entries.len() > capacity {
            entries.pop_front();
        }
    }

    /// Up to `limit` most recent results of a kind, most recent last.
    pub fn recent(&self, kind: CheckKind, limit: usize) -> Vec<CheckResult> {
        match self.entries.get(&kind) {
            Some(entries) => {
                let skip = entries.len().saturating_sub(limit);
                entries.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Most recent result of a kind.
    pub fn last(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.entries.get(&kind).and_then(|entries| entries.back())
    }

    pub fn len(&self, kind: CheckKind) -> usize {
        self.entries.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(VecDeque::is_empty)
    }

    /// Drop entries beyond `capacity` in every kind.
    pub fn trim(&mut self, capacity: usize) {
        for entries in self.entries.values_mut() {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
    }

    /// Latencies of all retained results, across kinds.
    pub fn latencies(&self) -> Vec<u64> {
        self.entries
            .values()
            .flat_map(|entries| entries.iter().map(|r| r.latency_ms))
            .collect()
    }
}
