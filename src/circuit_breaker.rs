//! Circuit breaker for failure isolation
//!
//! Stops attempting calls to a failing dependency during a cooldown. Three
//! states:
//! - Closed: calls pass through; matching failures count toward the trip
//!   threshold, any success resets the count
//! - Open: calls are rejected immediately without touching the dependency
//! - HalfOpen: after the recovery timeout, exactly one probe call is let
//!   through; its outcome decides between Closed and another Open period
//!
//! The admit decision and the post-call update share one lock, so two
//! concurrent callers can never both claim the single half-open probe slot.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, GuardError, Result};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls fail immediately until the probe time
    Open { next_probe: Instant },
    /// Circuit is testing recovery with a single probe call
    HalfOpen,
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive matching failures before the circuit opens
    pub failure_threshold: u32,

    /// How long an open circuit waits before letting a probe through
    pub recovery_timeout: Duration,

    /// Failure kind the breaker watches for; `None` counts every error
    pub expected_kind: Option<ErrorKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            expected_kind: None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// Per-dependency failure-isolation state machine.
///
/// # Example
/// ```
/// use callguard::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
/// use callguard::error::GuardError;
///
/// let breaker = CircuitBreaker::new("billing", CircuitBreakerConfig::default());
///
/// let result = breaker.call(|| {
///     // the outbound call
///     Ok::<_, GuardError>(42)
/// });
/// assert_eq!(result.unwrap(), 42);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker guarding the named dependency.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Create a breaker with default configuration.
    pub fn new_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// The dependency this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state of the circuit.
    pub fn state(&self) -> CircuitState {
        self.state.lock().unwrap().state
    }

    /// Consecutive matching failures observed while closed.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().unwrap().failure_count
    }

    /// Whether a call made right now would be allowed through.
    ///
    /// Non-mutating: a due probe is reported as permitted but not claimed.
    pub fn is_call_permitted(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open { next_probe } => Instant::now() >= next_probe,
            CircuitState::HalfOpen => !state.probe_in_flight,
        }
    }

    /// Return the breaker to closed with all counters cleared.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = BreakerState::new();
    }

    /// Execute one outbound call under this breaker.
    ///
    /// Rejects immediately with [`GuardError::CircuitOpen`] while the
    /// circuit is open (or while another caller holds the half-open probe
    /// slot). Otherwise runs `op` and re-raises its error after updating
    /// breaker state; errors whose kind does not match `expected_kind`
    /// pass through without affecting the breaker.
    pub fn call<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.admit()?;

        match op() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if self.matches(&error) {
                    self.on_failure();
                } else {
                    self.release_probe();
                }
                Err(error)
            }
        }
    }

    fn matches(&self, error: &GuardError) -> bool {
        match self.config.expected_kind {
            None => true,
            Some(expected) => error.kind() == Some(expected),
        }
    }

    /// Claim permission to call, transitioning open → half-open when the
    /// recovery timeout has elapsed.
    fn admit(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { next_probe } => {
                if Instant::now() >= next_probe {
                    state.state = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    tracing::debug!(name = %self.name, "circuit half-open, probing");
                    Ok(())
                } else {
                    Err(GuardError::CircuitOpen {
                        name: self.name.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    Err(GuardError::CircuitOpen {
                        name: self.name.clone(),
                    })
                } else {
                    state.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                tracing::info!(name = %self.name, "circuit closed after successful probe");
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.probe_in_flight = false;
            }
            // A success cannot be observed while open; recover to closed.
            CircuitState::Open { .. } => {
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.probe_in_flight = false;
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure = Some(now);
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        name = %self.name,
                        failures = state.failure_count,
                        "circuit opened"
                    );
                    state.state = CircuitState::Open {
                        next_probe: now + self.config.recovery_timeout,
                    };
                    state.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(name = %self.name, "probe failed, circuit re-opened");
                state.state = CircuitState::Open {
                    next_probe: now + self.config.recovery_timeout,
                };
                state.last_failure = Some(now);
                state.probe_in_flight = false;
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// A non-matching probe error neither closes nor re-opens the circuit;
    /// it only frees the probe slot for the next caller.
    fn release_probe(&self) {
        let mut state = self.state.lock().unwrap();
        if state.state == CircuitState::HalfOpen {
            state.probe_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn failing() -> Result<()> {
        Err(GuardError::timeout("simulated"))
    }

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: timeout,
                expected_kind: None,
            },
        )
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let breaker = breaker(3, Duration::from_secs(60));

        for _ in 0..2 {
            assert!(breaker.call(failing).is_err());
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        assert!(breaker.call(failing).is_err());
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = breaker(3, Duration::from_secs(60));

        assert!(breaker.call(failing).is_err());
        assert!(breaker.call(failing).is_err());
        assert_eq!(breaker.failure_count(), 2);

        assert!(breaker.call(|| Ok(())).is_ok());
        assert_eq!(breaker.failure_count(), 0);

        // The earlier failures no longer count toward the threshold.
        assert!(breaker.call(failing).is_err());
        assert!(breaker.call(failing).is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_without_invoking() {
        let breaker = breaker(1, Duration::from_secs(60));
        assert!(breaker.call(failing).is_err());

        let invoked = AtomicU32::new(0);
        let result = breaker.call(|| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(result, Err(GuardError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_probe_after_recovery_timeout() {
        let breaker = breaker(1, Duration::from_millis(50));
        assert!(breaker.call(failing).is_err());
        assert!(breaker.call(|| Ok(())).is_err());

        thread::sleep(Duration::from_millis(60));

        // The probe reaches the wrapped function and closes the circuit.
        let invoked = AtomicU32::new(0);
        let result = breaker.call(|| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = breaker(1, Duration::from_millis(50));
        assert!(breaker.call(failing).is_err());

        thread::sleep(Duration::from_millis(60));
        assert!(breaker.call(failing).is_err());

        // Re-opened: an immediate follow-up is rejected again.
        assert!(matches!(
            breaker.call(|| Ok(())),
            Err(GuardError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn test_non_matching_errors_pass_through() {
        let breaker = CircuitBreaker::new(
            "picky",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
                expected_kind: Some(ErrorKind::Timeout),
            },
        );

        // Connection errors are not what this breaker watches for.
        for _ in 0..5 {
            let result = breaker.call(|| Err::<(), _>(GuardError::connection("refused")));
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        // A matching error still trips it.
        assert!(breaker.call(failing).is_err());
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let breaker = Arc::new(breaker(1, Duration::from_millis(10)));
        assert!(breaker.call(failing).is_err());
        thread::sleep(Duration::from_millis(20));

        // First caller claims the probe slot and parks inside the call.
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let probe = {
            let breaker = Arc::clone(&breaker);
            thread::spawn(move || {
                breaker.call(move || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
            })
        };
        entered_rx.recv().unwrap();

        // Second caller finds the probe slot taken.
        assert!(matches!(
            breaker.call(|| Ok(())),
            Err(GuardError::CircuitOpen { .. })
        ));

        release_tx.send(()).unwrap();
        assert!(probe.join().unwrap().is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_matching_probe_error_keeps_half_open() {
        let breaker = CircuitBreaker::new(
            "picky",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_millis(10),
                expected_kind: Some(ErrorKind::Timeout),
            },
        );
        assert!(breaker.call(failing).is_err());
        thread::sleep(Duration::from_millis(20));

        // The probe fails with an unrelated kind: slot freed, still testing.
        let result = breaker.call(|| Err::<(), _>(GuardError::connection("refused")));
        assert!(result.is_err());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // The next caller gets the probe; success closes the circuit.
        assert!(breaker.call(|| Ok(())).is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_is_call_permitted_is_non_mutating() {
        let breaker = breaker(1, Duration::from_millis(10));
        assert!(breaker.is_call_permitted());

        assert!(breaker.call(failing).is_err());
        assert!(!breaker.is_call_permitted());

        thread::sleep(Duration::from_millis(20));
        assert!(breaker.is_call_permitted());
        // Asking twice is fine: the probe slot was not claimed.
        assert!(breaker.is_call_permitted());
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn test_reset() {
        let breaker = breaker(1, Duration::from_secs(60));
        assert!(breaker.call(failing).is_err());
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.call(|| Ok(())).is_ok());
    }
}
