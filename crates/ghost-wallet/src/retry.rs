//! Bounded retries for read-only adapter calls.
//!
//! Each attempt runs under a timeout. Transient failures and timeouts are
//! retried with exponential backoff up to `max_attempts`; any other error is
//! returned at once. Writes (approvals, transaction submission, wallet
//! creation) must not go through here.

use std::future::Future;
use std::time::Duration;

use ghost_core::AdapterError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Attempt limits, backoff and per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff.
    pub max_backoff: Duration,
    /// Deadline for a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the given timeout.
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            call_timeout,
        }
    }

    /// Backoff before attempt `attempt + 1` (1-based `attempt`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `f` until it succeeds, fails permanently, or attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut f: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(format!(
                "{op} exceeded {}ms",
                policy.call_timeout.as_millis()
            ))),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(op, attempt, max_attempts = attempts, error = %e, "retrying adapter call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
