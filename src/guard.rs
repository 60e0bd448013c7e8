//! Composition root for the resilience primitives
//!
//! [`CallGuard`] bundles one [`LimiterRegistry`] and one [`RecoveryEngine`]
//! behind the narrow call-site surface: admit, report, wrap, recover,
//! inspect. It is constructed explicitly and passed down; nothing in this
//! crate is a process-wide singleton.
//!
//! # Example
//!
//! ```
//! use callguard::config::RateLimitConfig;
//! use callguard::error::GuardError;
//! use callguard::guard::CallGuard;
//! use callguard::recovery::{RecoveryConfig, RecoveryEngine};
//! use std::time::{Duration, Instant};
//!
//! # fn main() -> Result<(), GuardError> {
//! let mut engine = RecoveryEngine::new(RecoveryConfig::default());
//! engine.register_fallback("users_list", || String::from("[]"));
//!
//! let guard = CallGuard::new(RateLimitConfig::default(), engine)?;
//!
//! guard.acquire("users_list", Some(Duration::from_millis(100)))?;
//! let started = Instant::now();
//! let outcome = guard.breaker("users").call(|| {
//!     // the outbound call
//!     Ok::<_, GuardError>(String::from("[\"alice\"]"))
//! });
//! guard.record_response("users_list", outcome.is_ok(), started.elapsed());
//!
//! let body = match outcome {
//!     Ok(body) => body,
//!     Err(error) => {
//!         let recovery = guard.handle_error(error, "users_list", 0);
//!         recovery.value.unwrap_or_default()
//!     }
//! };
//! # drop(body);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RateLimitConfig;
use crate::error::{ErrorKind, GuardError, Result};
use crate::rate_limiter::LimiterStatus;
use crate::recovery::{ErrorStats, RecoveryEngine, RecoveryResult};
use crate::registry::LimiterRegistry;

/// Explicitly constructed bundle of admission control and failure recovery.
pub struct CallGuard<V> {
    limiters: LimiterRegistry,
    engine: RecoveryEngine<V>,
}

impl<V> CallGuard<V> {
    /// Validate `config` and assemble the guard.
    pub fn new(config: RateLimitConfig, engine: RecoveryEngine<V>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limiters: LimiterRegistry::new(config),
            engine,
        })
    }

    /// Admit one outbound call for `key`, waiting up to `timeout`.
    ///
    /// A rejection means the call was never attempted; it surfaces as
    /// [`GuardError::RateLimitExceeded`] so callers can distinguish local
    /// throttling from dependency failures.
    pub fn acquire(&self, key: &str, timeout: Option<Duration>) -> Result<()> {
        if self.limiters.acquire(key, timeout) {
            Ok(())
        } else {
            Err(GuardError::RateLimitExceeded)
        }
    }

    /// Report how the admitted call for `key` went.
    pub fn record_response(&self, key: &str, success: bool, elapsed: Duration) {
        self.limiters.record_response(key, success, elapsed);
    }

    /// Feed an explicitly classified failure back to the limiter for `key`.
    pub fn record_error(&self, key: &str, kind: ErrorKind) {
        self.limiters.record_error(key, kind);
    }

    /// The breaker guarding `name`, created on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.engine.breaker(name)
    }

    /// Run the recovery strategy for a failure that already happened.
    pub fn handle_error(
        &self,
        error: GuardError,
        operation: &str,
        retry_count: u32,
    ) -> RecoveryResult<V> {
        self.engine.handle_error(error, operation, retry_count)
    }

    /// Status snapshot for one key, if a limiter exists for it.
    pub fn status(&self, key: &str) -> Option<LimiterStatus> {
        self.limiters.get(key).map(|limiter| limiter.status())
    }

    /// Status snapshots for every key seen so far.
    pub fn all_status(&self) -> Vec<(String, LimiterStatus)> {
        self.limiters.all_status()
    }

    /// Aggregate failure counters from the recovery engine.
    pub fn error_stats(&self) -> ErrorStats {
        self.engine.error_stats()
    }

    /// The underlying limiter registry.
    pub fn limiters(&self) -> &LimiterRegistry {
        &self.limiters
    }

    /// The underlying recovery engine.
    pub fn engine(&self) -> &RecoveryEngine<V> {
        &self.engine
    }
}
