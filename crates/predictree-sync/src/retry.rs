//! Retry with exponential backoff for transient platform failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::{PlatformError, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total tries including the first one.
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): doubling from the
    /// initial backoff, plus up to half again as jitter, capped at the max.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let base = self
            .initial_backoff_ms
            .saturating_mul(1 << exp)
            .min(self.max_backoff_ms);
        let jitter = if base >= 2 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_backoff_ms))
    }
}

/// Run `call` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(PlatformError::Transient(message)) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient platform error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(last @ PlatformError::Transient(_)) => {
                return Err(SyncError::RetriesExhausted {
                    operation,
                    attempts,
                    last,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}
