//! Deadline and bounded retry for calls that block on external latency.
//!
//! Embedding and completion calls both go through [`RetryPolicy::run`]. Every
//! attempt gets its own deadline; an elapsed deadline counts as a retryable
//! failure. Once the attempts are spent the last error is returned to the
//! caller instead of retrying forever.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never zero.
    pub max_attempts: u32,
    /// Deadline applied to each attempt.
    pub timeout: Duration,
    /// Delay after the first failure, doubled on every further failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            ..Self::default()
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// A policy that gives up after the first failure.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self::new(1, timeout)
    }

    fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::UpstreamTimeout {
                    operation: operation.to_string(),
                    attempts: attempt,
                }),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    warn!(operation, attempt, max_attempts = attempts, error = %err, "Retryable failure");
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(match last_error {
            Some(AppError::UpstreamTimeout { .. }) | None => AppError::UpstreamTimeout {
                operation: operation.to_string(),
                attempts,
            },
            Some(other) => other,
        })
    }
}
