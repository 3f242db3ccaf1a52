//! Resilience patterns for TW3 external calls
//!
//! This crate provides the wrappers used to protect calls to the news API
//! and the inference pipeline: a circuit breaker, a retry policy with
//! exponential backoff and a sliding-window rate limiter. They can be used
//! one by one or chained through a [`ResilienceStack`].

pub mod circuit_breaker;
pub mod error;
pub mod operation;
pub mod rate_limiter;
pub mod retry;
pub mod stack;

// Re-export common components
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use error::{ResilienceError, ResilienceResult};
pub use operation::Operation;
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
pub use retry::{RetryConfig, RetryPolicy};
pub use stack::ResilienceStack;
