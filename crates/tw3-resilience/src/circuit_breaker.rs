//! Circuit breaker pattern implementation
//!
//! Stops calling a failing service for a cooldown period, then lets a single
//! probe call through to decide whether the service has recovered.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::ResilienceError;

/// Circuit breaker states
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, a single probe call is allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures needed to trip the circuit
    pub failure_threshold: u32,
    /// Time in milliseconds to wait after the last failure before probing
    pub recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Serializable view of a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive counted failures
    pub failure_count: u32,
    /// Configured threshold
    pub failure_threshold: u32,
    /// Configured recovery timeout in milliseconds
    pub recovery_timeout_ms: u64,
    /// Milliseconds since the last counted failure
    pub since_last_failure_ms: Option<u64>,
}

/// Internal state for the circuit breaker
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    probe_in_flight: bool,
    /// Incremented on every probe admission so a stale guard never frees a newer probe
    probe_id: u64,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe(u64),
}

/// Circuit breaker implementation
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Frees the half-open probe slot if the probe ends without deciding the circuit
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    probe_id: u64,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.breaker.state.lock();
        if state.state == CircuitState::HalfOpen
            && state.probe_in_flight
            && state.probe_id == self.probe_id
        {
            state.probe_in_flight = false;
            debug!("Circuit breaker {} released undecided probe slot", self.breaker.name);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!("Creating new circuit breaker with name: {}, config: {:?}", name, config);
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probe_in_flight: false,
                probe_id: 0,
            })),
        }
    }

    /// Breaker name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state of the circuit
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Current count of consecutive counted failures
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Snapshot of the breaker for reporting
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: self.config.recovery_timeout_ms,
            since_last_failure_ms: state
                .last_failure_time
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }

    /// Force the circuit closed and clear the failure count
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure_time = None;
        state.probe_in_flight = false;
        info!("Circuit breaker {} manually reset", self.name);
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Every [`ResilienceError::Operation`] failure counts against the circuit.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.execute_classified(operation, |_| true).await
    }

    /// Execute an operation, counting only the operation failures `counts` accepts.
    ///
    /// Failures that are not counted, and rejections coming from inner
    /// wrappers, propagate unchanged without touching the circuit.
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        operation: F,
        counts: C,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        C: Fn(&E) -> bool,
    {
        let admission = self.admit()?;
        let _guard = match admission {
            Admission::Probe(probe_id) => Some(ProbeGuard {
                breaker: self,
                probe_id,
            }),
            Admission::Normal => None,
        };

        trace!("Circuit breaker {} executing protected operation", self.name);
        let result = operation().await;

        match &result {
            Ok(_) => self.on_success(admission),
            Err(ResilienceError::Operation(e)) if counts(e) => self.on_failure(admission),
            Err(e) => {
                debug!(
                    "Circuit breaker {} ignoring uncounted failure (rejection: {})",
                    self.name,
                    e.is_rejection()
                );
            }
        }

        result
    }

    /// Decide whether a call may run, moving Open to HalfOpen once the cooldown elapsed
    fn admit<E>(&self) -> Result<Admission, ResilienceError<E>> {
        let mut state = self.state.lock();
        let recovery_timeout = self.config.recovery_timeout();

        match state.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = state.last_failure_time.map(|t| t.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed < recovery_timeout => {
                        debug!(
                            "Circuit {} remains open, last failure was {:?} ago (recovery timeout: {:?})",
                            self.name, elapsed, recovery_timeout
                        );
                        Err(ResilienceError::CircuitOpen {
                            name: self.name.clone(),
                            failures: state.failure_count,
                            retry_in: recovery_timeout - elapsed,
                        })
                    }
                    _ => {
                        state.state = CircuitState::HalfOpen;
                        state.probe_in_flight = true;
                        state.probe_id = state.probe_id.wrapping_add(1);
                        info!(
                            "Circuit breaker {} transitioned to half-open, letting probe through",
                            self.name
                        );
                        Ok(Admission::Probe(state.probe_id))
                    }
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    debug!("Circuit {} rejecting call while probe is in flight", self.name);
                    Err(ResilienceError::CircuitOpen {
                        name: self.name.clone(),
                        failures: state.failure_count,
                        retry_in: Duration::ZERO,
                    })
                } else {
                    state.probe_in_flight = true;
                    state.probe_id = state.probe_id.wrapping_add(1);
                    debug!("Circuit {} admitting new half-open probe", self.name);
                    Ok(Admission::Probe(state.probe_id))
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut state = self.state.lock();
        match admission {
            Admission::Probe(_) => {
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.probe_in_flight = false;
                info!("Circuit breaker {} closed after successful probe", self.name);
            }
            // A late success from before the circuit tripped must not close it.
            Admission::Normal if state.state == CircuitState::Closed => {
                state.failure_count = 0;
            }
            Admission::Normal => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut state = self.state.lock();
        let now = Instant::now();
        match admission {
            Admission::Probe(_) => {
                state.state = CircuitState::Open;
                state.last_failure_time = Some(now);
                state.probe_in_flight = false;
                warn!("Circuit breaker {} reopened after failed probe", self.name);
            }
            Admission::Normal if state.state == CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure_time = Some(now);
                debug!(
                    "Circuit {} failure count increased to {}/{}",
                    self.name, state.failure_count, self.config.failure_threshold
                );
                if state.failure_count >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    warn!(
                        "Circuit breaker {} opened after {} consecutive failures",
                        self.name, state.failure_count
                    );
                }
            }
            Admission::Normal => {
                trace!(
                    "Circuit {} ignoring late failure while {}",
                    self.name,
                    state.state
                );
            }
        }
    }
}
