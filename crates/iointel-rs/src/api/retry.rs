//! Automatic retry with exponential backoff.
//!
//! Retries transient API errors (429, 5xx, timeouts, connection failures)
//! with doubling backoff and a separate delay floor for rate limits. Never
//! retries auth, client, or invalid-response errors.

use crate::api::error::{ApiError, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent attempt.
    pub base_delay: Duration,
    /// Minimum delay applied to rate-limit retries, reflecting realistic
    /// provider cooldowns. Expected to be ≥ `base_delay`, not enforced.
    pub rate_limit_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_floor: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given number of retries and default delays.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Backoff delay for a given attempt number (0-indexed):
    /// `base_delay × 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Backoff delay for a specific failure: the exponential delay, raised
    /// to `rate_limit_floor` when the error is a rate limit.
    pub fn delay_for_error(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if kind == ErrorKind::RateLimited {
            delay.max(self.rate_limit_floor)
        } else {
            delay
        }
    }
}

/// Run `op` up to `max_retries + 1` times, sleeping the computed backoff
/// between attempts.
///
/// A non-retryable error propagates immediately. When the retry budget is
/// exhausted, the *last* observed error is returned unchanged so callers
/// can act on the real cause.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_error(attempt, err.kind);
                warn!(
                    "attempt {}/{} failed ({err}), retrying in {:.1}s",
                    attempt + 1,
                    policy.max_retries + 1,
                    delay.as_secs_f64(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
