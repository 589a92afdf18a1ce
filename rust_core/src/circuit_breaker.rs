//! Circuit breaker for upstream API calls.
//!
//! Closed → Open after `failure_threshold` consecutive failures.
//! Open → HalfOpen once `recovery_timeout` has elapsed since the last failure.
//! HalfOpen → Closed after `success_threshold` successes; any failure reopens.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCircuitState {
    /// Requests are allowed
    Closed,
    /// Requests are blocked
    Open,
    /// Probing whether the API recovered
    HalfOpen,
}

/// Configuration for API circuit breaker
#[derive(Debug, Clone)]
pub struct ApiCircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Wait before probing again
    pub recovery_timeout: Duration,
    /// Successes in half-open state needed to close
    pub success_threshold: u32,
}

impl Default for ApiCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: ApiCircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Breaker guarding one upstream API
#[derive(Debug)]
pub struct ApiCircuitBreaker {
    name: String,
    config: ApiCircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl ApiCircuitBreaker {
    pub fn new(name: &str, config: ApiCircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: ApiCircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a request may be attempted now
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ApiCircuitState::Closed | ApiCircuitState::HalfOpen => true,
            ApiCircuitState::Open => {
                let waited = inner
                    .last_failure
                    .map_or(true, |t| t.elapsed() >= self.config.recovery_timeout);
                if waited {
                    inner.state = ApiCircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                }
                waited
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == ApiCircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes < self.config.success_threshold {
                return;
            }
            info!(
                "API circuit breaker '{}' closed after {} successful calls",
                self.name, inner.half_open_successes
            );
        }
        inner.state = ApiCircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        let state = inner.state;
        match state {
            ApiCircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = ApiCircuitState::Open;
                warn!(
                    "API circuit breaker '{}' OPENED after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
            }
            ApiCircuitState::HalfOpen => {
                inner.state = ApiCircuitState::Open;
                warn!("API circuit breaker '{}' re-OPENED during half-open trial", self.name);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> ApiCircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = ApiCircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.last_failure = None;
    }
}
