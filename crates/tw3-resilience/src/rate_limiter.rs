//!
//! Sliding-window rate limiter
//! Caps the number of calls admitted within any trailing window
//!

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ResilienceError;

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum number of calls allowed in the window
    pub max_calls: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: 100,
            window_ms: 3_600_000, // 1 hour
        }
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterStats {
    /// Identifier for the rate limiter
    pub name: String,
    /// Calls admitted within the current window
    pub current_count: u32,
    /// Maximum calls allowed in the window
    pub max_calls: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Milliseconds until the oldest admitted call leaves the window
    pub next_slot_in_ms: u64,
}

/// Rate limiter implementation
#[derive(Debug, Clone)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    /// Admission timestamps, oldest first
    calls: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            calls: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.config.window_ms)
    }

    /// Drop timestamps that are at least one window old
    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        let window = self.window();
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit one call now. Rejection leaves the recorded calls untouched.
    pub fn try_acquire<E>(&self) -> Result<(), ResilienceError<E>> {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.prune(&mut calls, now);

        if calls.len() < self.config.max_calls as usize {
            calls.push_back(now);
            debug!(
                "Rate limiter {} count: {}/{}",
                self.name,
                calls.len(),
                self.config.max_calls
            );
            Ok(())
        } else {
            warn!(
                "Rate limit reached for {}: {} calls per {:?}",
                self.name,
                self.config.max_calls,
                self.window()
            );
            Err(ResilienceError::RateLimitExceeded {
                name: self.name.clone(),
                max_calls: self.config.max_calls,
                window: self.window(),
            })
        }
    }

    /// Execute an operation if a call can be admitted
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.try_acquire()?;
        operation().await
    }

    /// Get current statistics for the rate limiter
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.prune(&mut calls, now);

        let next_slot_in_ms = calls
            .front()
            .map(|oldest| {
                self.window()
                    .saturating_sub(now.duration_since(*oldest))
                    .as_millis() as u64
            })
            .unwrap_or(0);

        RateLimiterStats {
            name: self.name.clone(),
            current_count: calls.len() as u32,
            max_calls: self.config.max_calls,
            window_ms: self.config.window_ms,
            next_slot_in_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_basic() {
        let config = RateLimiterConfig {
            max_calls: 3,
            window_ms: 1_000,
        };
        let rate_limiter = RateLimiter::new("test_limiter", config);

        // Should allow max_calls
        for i in 1..=3 {
            let result = rate_limiter
                .execute(|| async { Ok::<_, ResilienceError<String>>(()) })
                .await;
            assert!(result.is_ok(), "Request {} should be allowed", i);
        }

        // Next request should be rejected
        let result = rate_limiter
            .execute(|| async { Ok::<_, ResilienceError<String>>(()) })
            .await;
        assert!(
            matches!(result, Err(ResilienceError::RateLimitExceeded { max_calls: 3, .. })),
            "Request 4 should be rejected"
        );

        // After window expires, should allow more requests
        advance(Duration::from_secs(1)).await;

        let result = rate_limiter
            .execute(|| async { Ok::<_, ResilienceError<String>>(()) })
            .await;
        assert!(result.is_ok(), "Request after window expires should be allowed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_record_call() {
        let limiter = RateLimiter::new(
            "no_record",
            RateLimiterConfig {
                max_calls: 1,
                window_ms: 10_000,
            },
        );

        assert!(limiter.try_acquire::<()>().is_ok());
        advance(Duration::from_secs(5)).await;
        assert!(limiter.try_acquire::<()>().is_err());
        assert_eq!(limiter.stats().current_count, 1);

        // Only the admitted call ages out; the rejected one was never recorded
        advance(Duration::from_secs(5)).await;
        assert!(limiter.try_acquire::<()>().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_stats() {
        let limiter = RateLimiter::new(
            "stats_test",
            RateLimiterConfig {
                max_calls: 5,
                window_ms: 1_000,
            },
        );

        let stats = limiter.stats();
        assert_eq!(stats.current_count, 0);
        assert_eq!(stats.max_calls, 5);
        assert_eq!(stats.next_slot_in_ms, 0);

        for _ in 0..3 {
            limiter.try_acquire::<()>().unwrap();
        }
        advance(Duration::from_millis(400)).await;

        let stats = limiter.stats();
        assert_eq!(stats.current_count, 3);
        assert_eq!(stats.next_slot_in_ms, 600);
    }
}
