use std::time::Duration;

use serde::Deserialize;

use crate::RetryPolicy;

/// Review poller settings. Every field has a default, so a config only
/// needs the workflow id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub workflow_id: i64,
    /// Maximum number of submissions reviewed at once.
    pub worker_count: usize,
    /// Pause between spawning two workers.
    pub spawn_interval_ms: u64,
    /// Pause after a pass that found no new work.
    pub poll_delay_ms: u64,
    pub status_poll_interval_ms: u64,
    /// Download and parse each document's layout artifact before review.
    pub fetch_artifacts: bool,
    pub retry: RetryPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            workflow_id: 0,
            worker_count: 8,
            spawn_interval_ms: 250,
            poll_delay_ms: 30_000,
            status_poll_interval_ms: 1_000,
            fetch_artifacts: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl PollerConfig {
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}
