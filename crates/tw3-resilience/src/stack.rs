//! Composition of the resilience wrappers around an [`Operation`]
//!
//! Order of evaluation, innermost first: rate limiter, circuit breaker,
//! retry. Every retry attempt passes through the breaker and the limiter
//! again, so each failed attempt counts against the circuit and an open
//! circuit cuts the retries short. Rejections are never retried and never
//! counted as breaker failures.

use std::sync::Arc;
use tracing::trace;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::ResilienceError;
use crate::operation::Operation;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;

/// A chain of optional wrappers applied to every call
#[derive(Debug, Clone, Default)]
pub struct ResilienceStack {
    rate_limiter: Option<Arc<RateLimiter>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<Arc<RetryPolicy>>,
}

impl ResilienceStack {
    /// An empty stack that runs operations unprotected
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate calls through a rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Guard calls with a circuit breaker
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Retry failed calls
    pub fn with_retry(mut self, retry: Arc<RetryPolicy>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// The configured circuit breaker, if any
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// The configured rate limiter, if any
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Invoke `operation` through every configured wrapper
    pub async fn call<O>(&self, operation: &O) -> Result<O::Output, ResilienceError<O::Error>>
    where
        O: Operation + ?Sized,
    {
        let limited = move || async move {
            trace!("Invoking protected operation");
            let invoke = move || async move {
                operation.invoke().await.map_err(ResilienceError::Operation)
            };
            match &self.rate_limiter {
                Some(limiter) => limiter.execute(invoke).await,
                None => invoke().await,
            }
        };

        let guarded = move || async move {
            match &self.circuit_breaker {
                Some(breaker) => breaker.execute(limited).await,
                None => limited().await,
            }
        };

        match &self.retry {
            Some(retry) => retry.execute(guarded).await,
            None => guarded().await,
        }
    }
}
