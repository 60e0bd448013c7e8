//! Cooperative admission for event-loop callers
//!
//! [`AsyncGate`] is the async counterpart of the thread-blocking
//! [`RateLimiter`](crate::rate_limiter::RateLimiter): waiting for a token
//! suspends the calling task instead of blocking the thread. An optional
//! in-flight cap additionally bounds how many admitted operations run at
//! once; the returned [`GatePass`] releases that slot when dropped, on
//! every exit path including errors and cancellation. Rate-based tokens
//! need no release.
//!
//! # Example
//!
//! ```no_run
//! use callguard::async_gate::{AsyncGate, AsyncGateConfig};
//! use callguard::error::GuardError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), GuardError> {
//! let gate = AsyncGate::new(AsyncGateConfig {
//!     requests_per_second: 50.0,
//!     burst_size: 10,
//!     max_in_flight: Some(4),
//! });
//!
//! let pass = gate.admit_timeout(Duration::from_secs(1)).await?;
//! // perform the outbound call; the in-flight slot frees when `pass` drops
//! drop(pass);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::{GuardError, Result};
use crate::token_bucket::TokenBucket;
use crate::types::Decision;

/// Shortest suspension between token retries.
const MIN_RETRY_NAP: Duration = Duration::from_millis(1);

/// Settings for an [`AsyncGate`].
#[derive(Debug, Clone)]
pub struct AsyncGateConfig {
    /// Steady-state admission rate in requests per second
    pub requests_per_second: f64,

    /// Token bucket burst capacity
    pub burst_size: u32,

    /// Cap on simultaneously in-flight admitted operations, if any
    pub max_in_flight: Option<usize>,
}

impl Default for AsyncGateConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_size: 10,
            max_in_flight: None,
        }
    }
}

/// Proof of admission through an [`AsyncGate`].
///
/// Holds the in-flight slot (when the gate has a cap) until dropped.
#[derive(Debug)]
pub struct GatePass {
    _slot: Option<OwnedSemaphorePermit>,
}

/// Task-suspending admission gate.
#[derive(Debug)]
pub struct AsyncGate {
    bucket: Mutex<TokenBucket>,
    in_flight: Option<Arc<Semaphore>>,
}

impl AsyncGate {
    /// Create a gate from its configuration.
    pub fn new(config: AsyncGateConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(
                config.requests_per_second,
                f64::from(config.burst_size),
            )),
            in_flight: config
                .max_in_flight
                .map(|cap| Arc::new(Semaphore::new(cap))),
        }
    }

    /// Wait until both an in-flight slot and a rate token are available.
    ///
    /// Suspends the task, never the thread. With a zero refill rate and an
    /// empty bucket this future never resolves; pair it with
    /// [`admit_timeout`](Self::admit_timeout) if that can happen.
    pub async fn admit(&self) -> GatePass {
        let slot = match &self.in_flight {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .expect("gate semaphore closed"),
            ),
            None => None,
        };

        loop {
            let hint = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_consume(1.0) {
                    Decision::Granted => return GatePass { _slot: slot },
                    Decision::Rejected { retry_after } => retry_after,
                }
            };

            match hint {
                Some(wait) => tokio::time::sleep(wait.max(MIN_RETRY_NAP)).await,
                // Never admissible: suspend until the caller's timeout
                // (if any) cancels this future.
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Like [`admit`](Self::admit), but give up after `timeout`.
    pub async fn admit_timeout(&self, timeout: Duration) -> Result<GatePass> {
        tokio::time::timeout(timeout, self.admit())
            .await
            .map_err(|_| GuardError::RateLimitExceeded)
    }

    /// Tokens available right now.
    pub async fn available_tokens(&self) -> f64 {
        self.bucket.lock().await.available()
    }

    /// Free in-flight slots, if the gate has a cap.
    pub fn available_slots(&self) -> Option<usize> {
        self.in_flight
            .as_ref()
            .map(|semaphore| semaphore.available_permits())
    }
}
