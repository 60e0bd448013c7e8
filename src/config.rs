//! Configuration types
//!
//! [`RateLimitConfig`] is the single value object callers build once and
//! share by reference; every limiter created from it (directly or through
//! the registry) reads the same immutable settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GuardError, Result};

/// Admission-control strategy for a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Continuous token replenishment with burst capacity
    #[default]
    TokenBucket,

    /// Discrete event counting over a trailing window
    SlidingWindow,

    /// Token bucket whose rate tracks success/latency/error feedback
    Adaptive,
}

/// Settings shared by every rate limiter built from one configuration.
///
/// All fields have serde defaults, so partial configuration files work:
///
/// ```
/// use callguard::config::RateLimitConfig;
///
/// let config = RateLimitConfig {
///     requests_per_second: 50.0,
///     burst_size: 100,
///     ..RateLimitConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Steady-state request rate in requests per second
    pub requests_per_second: f64,

    /// Bucket capacity: how many requests may burst at once
    pub burst_size: u32,

    /// Trailing window length for the sliding-window strategy
    pub window_size: Duration,

    /// Which admission structure to use
    pub strategy: Strategy,

    /// Lower bound for the adaptive rate
    pub adaptive_min: f64,

    /// Upper bound for the adaptive rate
    pub adaptive_max: f64,

    /// Multiplier applied when backing the rate off (0 < factor <= 1)
    pub backoff_factor: f64,

    /// Multiplier applied when raising the rate (>= 1)
    pub increase_factor: f64,

    /// Minimum time between periodic adaptive adjustments
    pub adjustment_interval: Duration,

    /// Mean response time at or below which traffic counts as fast
    pub latency_target: Duration,

    /// Mean response time above which traffic counts as slow
    pub latency_ceiling: Duration,

    /// Error ratio below which traffic counts as healthy
    pub error_ratio_floor: f64,

    /// Error ratio above which the rate is backed off
    pub error_ratio_ceiling: f64,

    /// Capacity of the bounded response-time sample buffer
    pub sample_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_size: 10,
            window_size: Duration::from_secs(1),
            strategy: Strategy::default(),
            adaptive_min: 1.0,
            adaptive_max: 100.0,
            backoff_factor: 0.5,
            increase_factor: 1.1,
            adjustment_interval: Duration::from_secs(10),
            latency_target: Duration::from_millis(500),
            latency_ceiling: Duration::from_secs(2),
            error_ratio_floor: 0.05,
            error_ratio_ceiling: 0.2,
            sample_capacity: 256,
        }
    }
}

impl RateLimitConfig {
    /// Check the configuration for values the limiters cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_second < 0.0 || !self.requests_per_second.is_finite() {
            return Err(GuardError::Config(format!(
                "requests_per_second must be a finite non-negative number, got {}",
                self.requests_per_second
            )));
        }
        if !(self.backoff_factor > 0.0 && self.backoff_factor <= 1.0) {
            return Err(GuardError::Config(format!(
                "backoff_factor must be in (0, 1], got {}",
                self.backoff_factor
            )));
        }
        if self.increase_factor < 1.0 {
            return Err(GuardError::Config(format!(
                "increase_factor must be >= 1, got {}",
                self.increase_factor
            )));
        }
        if self.adaptive_min > self.adaptive_max {
            return Err(GuardError::Config(format!(
                "adaptive_min {} exceeds adaptive_max {}",
                self.adaptive_min, self.adaptive_max
            )));
        }
        if self.adaptive_min < 0.0 {
            return Err(GuardError::Config(format!(
                "adaptive_min must be non-negative, got {}",
                self.adaptive_min
            )));
        }
        if self.error_ratio_floor > self.error_ratio_ceiling {
            return Err(GuardError::Config(format!(
                "error_ratio_floor {} exceeds error_ratio_ceiling {}",
                self.error_ratio_floor, self.error_ratio_ceiling
            )));
        }
        if self.sample_capacity == 0 {
            return Err(GuardError::Config(
                "sample_capacity must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum events the sliding window admits per trailing window.
    ///
    /// Derived from the configured rate: `ceil(rate × window)`.
    pub fn window_max_requests(&self) -> usize {
        (self.requests_per_second * self.window_size.as_secs_f64()).ceil() as usize
    }

    /// Starting rate for the adaptive controller, clamped into bounds.
    pub fn initial_adaptive_rate(&self) -> f64 {
        self.requests_per_second
            .clamp(self.adaptive_min, self.adaptive_max)
    }
}
