use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between timer-driven passes.
    pub poll_interval: Duration,
    /// Offline duration at which the fail-safe lock engages.
    pub offline_lock_threshold: Duration,
    /// Upper bound on any single backend call made by the engine.
    pub request_timeout: Duration,
    /// Days before the next payment at which subscribers are told it is due.
    pub reminder_threshold_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15 * 60),
            offline_lock_threshold: Duration::from_secs(7 * 24 * 60 * 60),
            request_timeout: Duration::from_secs(10),
            reminder_threshold_days: 5,
        }
    }
}

impl EngineConfig {
    pub(crate) fn offline_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.offline_lock_threshold).unwrap_or(chrono::Duration::MAX)
    }
}
