//! Token bucket admission primitive
//!
//! Capacity replenishes continuously at `rate` tokens per second, capped at
//! `capacity`. Every check replenishes first, then decides, so the two steps
//! form one atomic operation from the caller's point of view: the owning
//! limiter wraps each bucket in its own lock.

use std::time::{Duration, Instant};

use crate::types::Decision;

/// Continuously replenishing token bucket.
///
/// Token count is always within `[0, capacity]`.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// Create a full bucket replenishing `rate` tokens/sec up to `capacity`.
    pub fn new(rate: f64, capacity: f64) -> Self {
        let capacity = capacity.max(0.0);
        Self {
            rate: rate.max(0.0),
            capacity,
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Replenish for elapsed time, then try to take `n` tokens.
    ///
    /// On rejection the hint is `(n - tokens) / rate`. A zero-rate bucket
    /// still grants while it holds leftover tokens; once empty it rejects
    /// with no hint, since no amount of waiting will refill it.
    pub fn try_consume(&mut self, n: f64) -> Decision {
        self.replenish();

        if self.tokens >= n {
            self.tokens -= n;
            return Decision::Granted;
        }

        if self.rate <= 0.0 {
            return Decision::Rejected { retry_after: None };
        }

        let deficit = n - self.tokens;
        let wait = Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(Duration::MAX);
        Decision::Rejected {
            retry_after: Some(wait),
        }
    }

    /// Current token count after replenishment, without consuming.
    pub fn available(&mut self) -> f64 {
        self.replenish();
        self.tokens
    }

    /// Change the replenish rate.
    ///
    /// Elapsed time is accrued at the old rate first, so a rate change
    /// never rewrites the past.
    pub fn set_rate(&mut self, rate: f64) {
        self.replenish();
        self.rate = rate.max(0.0);
    }

    /// The current replenish rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The burst capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill to capacity and restart the clock.
    pub fn refill(&mut self) {
        self.tokens = self.capacity;
        self.last_update = Instant::now();
    }

    fn replenish(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        if elapsed > 0.0 && self.rate > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        }
        self.last_update = now;
    }
}
