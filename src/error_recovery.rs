//! Circuit breaker for the optional embedding provider.
//!
//! Query embedding runs synchronously inside a search, so the breaker is sync
//! as well: a `std::sync::Mutex` around the state, never held across the call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::anyhow;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_threshold: u32,
    timeout: Duration,
    state: Mutex<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, 1, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_threshold: recovery_threshold.max(1),
            timeout,
            state: Mutex::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a call would currently be short-circuited.
    pub fn is_open(&self) -> bool {
        match self.state() {
            CircuitState::Open { opened_at } => opened_at.elapsed() < self.timeout,
            _ => false,
        }
    }

    /// Execute an operation through the circuit breaker
    pub fn call<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let CircuitState::Open { opened_at } = *state {
                if opened_at.elapsed() >= self.timeout {
                    *state = CircuitState::HalfOpen;
                    self.success_count.store(0, Ordering::Relaxed);
                    tracing::info!("Circuit breaker transitioning to half-open");
                } else {
                    return Err(E::from(anyhow!("Circuit breaker open")));
                }
            }
        }

        match f() {
            Ok(val) => {
                self.record_success();
                Ok(val)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.recovery_threshold {
                    *state = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::Relaxed);
                    tracing::info!("Circuit breaker recovered (closed)");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::Open { .. } => {}
        }
    }

    fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let trip = match *state {
            // a failed probe reopens immediately
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= self.failure_threshold,
            CircuitState::Open { .. } => false,
        };
        if trip {
            *state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            tracing::warn!("Circuit breaker tripped (open) after {} failures", failures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail() -> anyhow::Result<()> {
        Err(anyhow!("boom"))
    }

    #[test]
    fn test_trips_after_threshold() {
        let cb = CircuitBreaker::new(2, 1, Duration::from_secs(60));
        assert!(cb.call(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.call(fail).is_err());
        assert!(cb.is_open());

        let mut ran = false;
        let res: anyhow::Result<()> = cb.call(|| {
            ran = true;
            Ok(())
        });
        assert!(res.is_err());
        assert!(!ran, "open breaker must not invoke the operation");
    }

    #[test]
    fn test_recovers_after_timeout() {
        let cb = CircuitBreaker::new(1, 1, Duration::from_millis(0));
        assert!(cb.call(fail).is_err());
        assert!(matches!(cb.state(), CircuitState::Open { .. }));

        let res: anyhow::Result<u8> = cb.call(|| Ok(7));
        assert_eq!(res.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(2, 1, Duration::from_secs(60));
        assert!(cb.call(fail).is_err());
        let _: anyhow::Result<()> = cb.call(|| Ok(()));
        assert!(cb.call(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
