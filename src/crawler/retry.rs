//! Retry with exponential backoff
//!
//! The delay schedule is a pure function of the attempt number ([`RetryPolicy::next_delay`]);
//! [`retry_with_backoff`] is the bounded loop around it. Cancellation is observed while waiting
//! between attempts, never in the middle of one.

use crate::crawler::source::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry schedule for fetch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-based)
    ///
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),

    /// Every attempt failed; `error` is the last failure
    Exhausted { error: FetchError, attempts: u32 },

    /// Cancellation was requested before the operation could succeed
    Cancelled,
}

/// Runs `operation` until it succeeds, retries are exhausted, or `cancel` fires
///
/// Each attempt is bounded by `timeout`; an attempt that overruns it fails with
/// [`FetchError::Timeout`]. An attempt already in flight when cancellation is requested is
/// allowed to finish (within its timeout) and its success is still returned.
///
/// # Arguments
///
/// * `policy` - Retry count and backoff schedule
/// * `timeout` - Upper bound on a single attempt
/// * `cancel` - Cooperative cancellation token
/// * `operation` - Produces a fresh future per attempt
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        let error = match result {
            Ok(value) => return RetryOutcome::Success(value),
            Err(error) => error,
        };
        attempt += 1;

        if attempt >= max_attempts {
            return RetryOutcome::Exhausted {
                error,
                attempts: attempt,
            };
        }

        let delay = policy.next_delay(attempt - 1);
        tracing::debug!(
            "Attempt {}/{} failed ({}), retrying in {:?}",
            attempt,
            max_attempts,
            error,
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
