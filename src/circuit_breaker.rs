/*!
 * # Circuit Breaker
 *
 * Guards outbound calls to the inventory service. After `failure_threshold`
 * consecutive failures the breaker opens and rejects calls without touching the
 * network until `timeout` has elapsed; then a limited number of probe calls are
 * let through (half-open) to decide whether to close again.
 */

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub timeout: Duration,
    /// Successful probes needed in HalfOpen to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Runs `f` unless the circuit is open. Every `Err` counts as a failure
    /// unless `is_failure` says otherwise; business rejections from a healthy
    /// service should not trip the breaker.
    pub async fn call<F, Fut, T, E>(
        &self,
        is_failure: impl Fn(&E) -> bool,
        f: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.can_execute() {
            return Err(CircuitBreakerError::CircuitOpen);
        }
        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if is_failure(&err) {
                    self.on_failure();
                } else {
                    self.on_success();
                }
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn can_execute(&self) -> bool {
        let mut state = self.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!(breaker = self.name, "Circuit half-open, probing");
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                }
                elapsed
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();
        match state.state {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen | CircuitState::Open => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(breaker = self.name, "Circuit closed");
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.opened_at = None;
                }
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        let trip = match state.state {
            CircuitState::Closed => state.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            warn!(
                breaker = self.name,
                failures = state.failure_count,
                "Circuit opened"
            );
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            state.success_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout,
                success_threshold: 1,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|_| true, || async { Err::<(), _>("boom") }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects() {
        let cb = breaker(Duration::from_secs(60));
        assert_eq!(fail(&cb).await, Err(CircuitBreakerError::Inner("boom")));
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|_: &&str| true, || async { Ok::<_, &str>(1) }).await;
        assert_eq!(result, Err(CircuitBreakerError::CircuitOpen));
    }

    #[tokio::test]
    async fn half_open_probe_closes_circuit() {
        let cb = breaker(Duration::from_millis(0));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        let result = cb.call(|_: &&str| true, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn non_failures_do_not_trip() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let _ = cb.call(|_| false, || async { Err::<(), _>("rejected") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
