//! Feedback-driven rate control
//!
//! The controller maintains a target rate inside `[adaptive_min,
//! adaptive_max]` and moves it two ways:
//!
//! - an explicit upstream throttle signal ([`ErrorKind::RateLimited`]) cuts
//!   the rate immediately by `backoff_factor`
//! - all other feedback is smoothed through a periodic adjustment, checked
//!   lazily on each record call once `adjustment_interval` has elapsed:
//!   fast, low-error traffic raises the rate by `increase_factor`; slow or
//!   error-heavy traffic backs it off; then the observation window resets

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::ErrorKind;

/// Adjusts a target rate from success/latency/error observations.
#[derive(Debug)]
pub struct AdaptiveController {
    config: Arc<RateLimitConfig>,
    current_rate: f64,
    success_count: u64,
    error_count: u64,
    response_times: VecDeque<Duration>,
    last_adjustment: Instant,
}

impl AdaptiveController {
    /// Create a controller starting at the configured rate, clamped into
    /// the adaptive bounds.
    pub fn new(config: Arc<RateLimitConfig>) -> Self {
        let current_rate = config.initial_adaptive_rate();
        Self {
            config,
            current_rate,
            success_count: 0,
            error_count: 0,
            response_times: VecDeque::with_capacity(64),
            last_adjustment: Instant::now(),
        }
    }

    /// Record a successful call and its response time.
    pub fn record_success(&mut self, response_time: Duration) {
        self.success_count += 1;
        if self.response_times.len() >= self.config.sample_capacity {
            self.response_times.pop_front();
        }
        self.response_times.push_back(response_time);
        self.maybe_adjust();
    }

    /// Record a failed call.
    ///
    /// An upstream throttle signal backs the rate off immediately instead of
    /// waiting for the next periodic adjustment.
    pub fn record_error(&mut self, kind: ErrorKind) {
        self.error_count += 1;
        if kind == ErrorKind::RateLimited {
            self.back_off("upstream throttle signal");
        }
        self.maybe_adjust();
    }

    /// The current target rate in requests per second.
    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    /// Return to the initial rate and forget all observations.
    pub fn reset(&mut self) {
        self.current_rate = self.config.initial_adaptive_rate();
        self.success_count = 0;
        self.error_count = 0;
        self.response_times.clear();
        self.last_adjustment = Instant::now();
    }

    fn back_off(&mut self, reason: &str) {
        let next = (self.current_rate * self.config.backoff_factor).max(self.config.adaptive_min);
        if next < self.current_rate {
            tracing::debug!(
                from = self.current_rate,
                to = next,
                reason,
                "reducing target rate"
            );
        }
        self.current_rate = next;
    }

    fn raise(&mut self) {
        let next = (self.current_rate * self.config.increase_factor).min(self.config.adaptive_max);
        if next > self.current_rate {
            tracing::debug!(from = self.current_rate, to = next, "raising target rate");
        }
        self.current_rate = next;
    }

    fn maybe_adjust(&mut self) {
        if self.last_adjustment.elapsed() < self.config.adjustment_interval {
            return;
        }

        let total = self.success_count + self.error_count;
        if total > 0 {
            let error_ratio = self.error_count as f64 / total as f64;
            let mean_response = self.mean_response_time();

            if error_ratio > self.config.error_ratio_ceiling
                || mean_response > self.config.latency_ceiling
            {
                self.back_off("degraded feedback window");
            } else if error_ratio < self.config.error_ratio_floor
                && mean_response <= self.config.latency_target
            {
                self.raise();
            }
        }

        self.success_count = 0;
        self.error_count = 0;
        self.response_times.clear();
        self.last_adjustment = Instant::now();
    }

    fn mean_response_time(&self) -> Duration {
        if self.response_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.response_times.iter().sum();
        total / self.response_times.len() as u32
    }
}
