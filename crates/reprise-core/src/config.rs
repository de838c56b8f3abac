//! Replay configuration.

use serde::{Deserialize, Serialize};

use crate::clock::LogicalTime;

/// Default number of events a driver may dispatch per scheduling turn.
pub const DEFAULT_FRAGMENT_LIMIT: u32 = 10;

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Time the logical clock starts at, before any event is dispatched
    pub initial_time_ns: LogicalTime,
    /// Events a driver may dispatch per scheduling turn before the rate probe
    /// reports
    pub fragment_limit: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { initial_time_ns: 0, fragment_limit: DEFAULT_FRAGMENT_LIMIT }
    }
}

impl ReplayConfig {
    /// Set the initial clock time.
    #[must_use]
    pub fn with_initial_time_ns(mut self, initial_time_ns: LogicalTime) -> Self {
        self.initial_time_ns = initial_time_ns;
        self
    }

    /// Set the per-turn fragment limit.
    #[must_use]
    pub fn with_fragment_limit(mut self, fragment_limit: u32) -> Self {
        self.fragment_limit = fragment_limit;
        self
    }
}
