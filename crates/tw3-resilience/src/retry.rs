//! Retry with exponential backoff

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::ResilienceError;

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
        }
    }
}

/// Re-invokes a fallible operation with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: String,
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Policy configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay slept after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = (self.config.base_delay_ms as f64
            * self.config.exponential_base.powi(exponent))
        .min(self.config.max_delay_ms as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Run `operation`, retrying every operation failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: std::fmt::Display,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Run `operation`, retrying only the operation failures `retryable` accepts.
    ///
    /// The error of the final attempt is returned as-is. Rejections from
    /// inner wrappers are never retried.
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        retryable: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", self.name, attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let should_retry = match &err {
                ResilienceError::Operation(e) => retryable(e),
                _ => false,
            };
            if !should_retry {
                debug!("{} failed with non-retryable error: {}", self.name, err);
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    "{} failed permanently after {} attempts: {}",
                    self.name, max_attempts, err
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            warn!(
                "{} attempt {}/{} failed: {}. Retrying in {:.1}s",
                self.name,
                attempt,
                max_attempts,
                err,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
