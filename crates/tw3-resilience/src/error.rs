//! Error types for the resilience wrappers
//!
//! Every wrapper fails with a [`ResilienceError`], which either carries the
//! untouched error of the wrapped operation or describes why the call was
//! rejected before the operation ran.

use std::time::Duration;
use thiserror::Error;

/// Resilience error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError<E> {
    /// The circuit breaker rejected the call without attempting it
    #[error("Circuit breaker {name} is open after {failures} failures, retry in {retry_in:?}")]
    CircuitOpen {
        /// Name of the breaker that rejected the call
        name: String,
        /// Failure count at the time of rejection
        failures: u32,
        /// Time left before a probe call will be let through
        retry_in: Duration,
    },

    /// The rate limiter rejected the call before any attempt
    #[error("Rate limit exceeded for {name}: {max_calls} calls per {window:?}")]
    RateLimitExceeded {
        /// Name of the limiter that rejected the call
        name: String,
        /// Maximum calls admitted within the window
        max_calls: u32,
        /// Length of the sliding window
        window: Duration,
    },

    /// The wrapped operation itself failed
    #[error("{0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// Whether the call was rejected by a wrapper rather than failed by the operation
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ResilienceError::Operation(_))
    }

    /// Borrow the underlying operation error, if any
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Consume the error and return the underlying operation error, if any
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for wrapped operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
