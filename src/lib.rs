//! Callguard: client-side resilience primitives for outbound calls
//!
//! # Overview
//!
//! This crate provides the building blocks an application needs to call an
//! unreliable remote dependency without hurting itself or the dependency:
//!
//! - **Rate Limiter**: token-bucket, sliding-window, or adaptive admission
//!   control, one instance per tenant key
//! - **Limiter Registry**: lazily creates and caches one limiter per key
//!   (typically `{service}_{endpoint}`)
//! - **Adaptive Controller**: steers a target rate from success, latency,
//!   and error feedback
//! - **Async Gate**: cooperative admission for event-loop callers, with an
//!   optional in-flight cap released on every exit path
//! - **Circuit Breaker**: fails fast while a dependency is unhealthy and
//!   probes it after a cooldown
//! - **Error Classifier + Recovery Engine**: maps failure kinds to
//!   severities and recovery strategies (retry, fallback, degrade,
//!   circuit-break, fail-fast), with a bounded error history
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Transports and protocols (HTTP, gRPC, TLS, connection pools)
//! - Vendor endpoint shapes or business arithmetic
//! - Cross-process coordination (every process owns its own state)
//!
//! Callers always learn *which* guard stopped a call: local throttling,
//! an open circuit, and a genuine dependency failure are distinct errors.
//!
//! # Usage Example
//!
//! ```
//! use callguard::prelude::*;
//! use std::time::{Duration, Instant};
//!
//! # fn remote_call() -> Result<String, GuardError> { Ok("ok".into()) }
//! # fn main() -> Result<(), GuardError> {
//! let engine: RecoveryEngine<String> = RecoveryEngine::new(RecoveryConfig::default());
//! let guard = CallGuard::new(RateLimitConfig::default(), engine)?;
//!
//! // Admission, the wrapped call, then feedback.
//! guard.acquire("search_query", Some(Duration::from_millis(250)))?;
//! let started = Instant::now();
//! let outcome = guard.breaker("search").call(remote_call);
//! guard.record_response("search_query", outcome.is_ok(), started.elapsed());
//!
//! if let Err(error) = outcome {
//!     let recovery = guard.handle_error(error, "search_query", 0);
//!     if recovery.should_retry() {
//!         // the caller owns the retry loop
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod adaptive;
pub mod async_gate;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod guard;
pub mod rate_limiter;
pub mod recovery;
pub mod registry;
pub mod sliding_window;
pub mod token_bucket;
pub mod types;

// Re-export main types for convenience
pub use adaptive::AdaptiveController;
pub use async_gate::{AsyncGate, AsyncGateConfig, GatePass};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{RateLimitConfig, Strategy};
pub use error::{ErrorKind, GuardError, Result, Severity};
pub use guard::CallGuard;
pub use rate_limiter::{LimiterStatus, RateLimiter};
pub use recovery::{
    ErrorClassifier, ErrorContext, ErrorStats, RecoveryConfig, RecoveryEngine, RecoveryResult,
    RecoveryStrategy,
};
pub use registry::LimiterRegistry;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
pub use types::Decision;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use callguard::prelude::*;
/// ```
pub mod prelude {
    pub use super::async_gate::{AsyncGate, AsyncGateConfig, GatePass};
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::config::{RateLimitConfig, Strategy};
    pub use super::error::{ErrorKind, GuardError, Severity};
    pub use super::guard::CallGuard;
    pub use super::rate_limiter::{LimiterStatus, RateLimiter};
    pub use super::recovery::{
        ErrorClassifier, RecoveryConfig, RecoveryEngine, RecoveryResult, RecoveryStrategy,
    };
    pub use super::registry::LimiterRegistry;
}
