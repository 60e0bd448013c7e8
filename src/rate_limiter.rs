//! Per-key admission control
//!
//! A [`RateLimiter`] owns one admission engine chosen by the configured
//! strategy and answers `acquire` for every outbound call against its key.
//! The instance lock is only held for constant-time state updates; waiting
//! for a slot happens outside it, so status snapshots never queue behind a
//! sleeping caller.
//!
//! # Example
//!
//! ```
//! use callguard::config::RateLimitConfig;
//! use callguard::rate_limiter::RateLimiter;
//!
//! let limiter = RateLimiter::new(RateLimitConfig {
//!     requests_per_second: 100.0,
//!     burst_size: 10,
//!     ..RateLimitConfig::default()
//! });
//!
//! if limiter.try_acquire() {
//!     // perform the outbound call, then report how it went
//!     limiter.record_response(true, std::time::Duration::from_millis(42));
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::adaptive::AdaptiveController;
use crate::config::{RateLimitConfig, Strategy};
use crate::error::ErrorKind;
use crate::sliding_window::SlidingWindow;
use crate::token_bucket::TokenBucket;
use crate::types::Decision;

/// Shortest nap between admission retries, so a tiny hint cannot spin.
const MIN_RETRY_NAP: Duration = Duration::from_millis(1);

/// Strategy-specific admission state.
#[derive(Debug)]
enum Engine {
    Bucket(TokenBucket),
    Window(SlidingWindow),
    Adaptive {
        controller: AdaptiveController,
        bucket: TokenBucket,
    },
}

impl Engine {
    fn check(&mut self) -> Decision {
        match self {
            Engine::Bucket(bucket) => bucket.try_consume(1.0),
            Engine::Window(window) => window.allow(),
            Engine::Adaptive { controller, bucket } => {
                // The bucket drains at whatever rate the feedback has
                // steered to since the last check.
                bucket.set_rate(controller.current_rate());
                bucket.try_consume(1.0)
            }
        }
    }
}

/// Read-only snapshot of a limiter's state.
#[derive(Debug, Clone)]
pub struct LimiterStatus {
    /// The configured admission strategy
    pub strategy: Strategy,

    /// Admission attempts since creation (or the last reset)
    pub total_requests: u64,

    /// Attempts that ended in a final rejection
    pub rejected_requests: u64,

    /// Current target rate in requests per second
    pub current_rate: f64,

    /// Permits available right now (tokens, or free window slots)
    pub available_permits: f64,
}

/// Per-key rate limiter.
///
/// Safe to share across threads behind an `Arc`; created once per key and
/// kept for the process lifetime.
#[derive(Debug)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    engine: Mutex<Engine>,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter from an owned configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_shared(Arc::new(config))
    }

    /// Create a limiter sharing an already-distributed configuration.
    pub fn with_shared(config: Arc<RateLimitConfig>) -> Self {
        let engine = match config.strategy {
            Strategy::TokenBucket => Engine::Bucket(TokenBucket::new(
                config.requests_per_second,
                f64::from(config.burst_size),
            )),
            Strategy::SlidingWindow => Engine::Window(SlidingWindow::new(
                config.window_size,
                config.window_max_requests(),
            )),
            Strategy::Adaptive => Engine::Adaptive {
                controller: AdaptiveController::new(Arc::clone(&config)),
                bucket: TokenBucket::new(
                    config.initial_adaptive_rate(),
                    f64::from(config.burst_size),
                ),
            },
        };

        Self {
            config,
            engine: Mutex::new(engine),
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
        }
    }

    /// Try to admit one request without waiting.
    pub fn try_acquire(&self) -> bool {
        self.acquire(None)
    }

    /// Try to admit one request, waiting up to `timeout` for a slot.
    ///
    /// With no timeout a rejection is final. With a timeout, rejection
    /// hints bound the sleeps between retries; at deadline expiry the call
    /// returns `false` even if a slot frees up a moment later.
    pub fn acquire(&self, timeout: Option<Duration>) -> bool {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let decision = self.engine.lock().unwrap().check();

            let hint = match decision {
                Decision::Granted => return true,
                Decision::Rejected { retry_after } => retry_after,
            };

            let Some(deadline) = deadline else {
                return self.reject();
            };
            let now = Instant::now();
            if now >= deadline {
                return self.reject();
            }

            let remaining = deadline.duration_since(now);
            let nap = match hint {
                Some(hint) if hint < remaining => hint.max(MIN_RETRY_NAP),
                // No hint, or a hint past the deadline: the wait cannot pay
                // off inside the budget, so sleep it out and reject.
                _ => remaining,
            };
            thread::sleep(nap);

            if Instant::now() >= deadline {
                return self.reject();
            }
        }
    }

    /// Feed the outcome of an admitted call back into the limiter.
    ///
    /// Only the adaptive strategy consumes this; under the fixed strategies
    /// it is a safe no-op.
    pub fn record_response(&self, success: bool, elapsed: Duration) {
        let mut engine = self.engine.lock().unwrap();
        if let Engine::Adaptive { controller, .. } = &mut *engine {
            if success {
                controller.record_success(elapsed);
            } else {
                controller.record_error(ErrorKind::Internal);
            }
        }
    }

    /// Feed an explicitly classified failure back into the limiter.
    ///
    /// An upstream throttle kind triggers the controller's immediate
    /// penalty. No-op under the fixed strategies.
    pub fn record_error(&self, kind: ErrorKind) {
        let mut engine = self.engine.lock().unwrap();
        if let Engine::Adaptive { controller, .. } = &mut *engine {
            controller.record_error(kind);
        }
    }

    /// Read-only snapshot of counters and current capacity.
    pub fn status(&self) -> LimiterStatus {
        let mut engine = self.engine.lock().unwrap();
        let (current_rate, available_permits) = match &mut *engine {
            Engine::Bucket(bucket) => (bucket.rate(), bucket.available()),
            Engine::Window(window) => {
                let free = window.max_requests().saturating_sub(window.current_count());
                let rate = if window.window().is_zero() {
                    f64::INFINITY
                } else {
                    window.max_requests() as f64 / window.window().as_secs_f64()
                };
                (rate, free as f64)
            }
            Engine::Adaptive { controller, bucket } => {
                bucket.set_rate(controller.current_rate());
                (controller.current_rate(), bucket.available())
            }
        };

        LimiterStatus {
            strategy: self.config.strategy,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            current_rate,
            available_permits,
        }
    }

    /// Zero the counters and refill capacity to its baseline.
    pub fn reset(&self) {
        let mut engine = self.engine.lock().unwrap();
        match &mut *engine {
            Engine::Bucket(bucket) => bucket.refill(),
            Engine::Window(window) => window.clear(),
            Engine::Adaptive { controller, bucket } => {
                controller.reset();
                bucket.set_rate(controller.current_rate());
                bucket.refill();
            }
        }
        self.total_requests.store(0, Ordering::Relaxed);
        self.rejected_requests.store(0, Ordering::Relaxed);
    }

    /// The configuration this limiter was built from.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn reject(&self) -> bool {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_config(rps: f64, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rps,
            burst_size: burst,
            strategy: Strategy::TokenBucket,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn test_burst_then_reject_then_recover() {
        let limiter = RateLimiter::new(bucket_config(2.0, 2));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        thread::sleep(Duration::from_millis(500));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_acquire_with_timeout_waits_for_slot() {
        let limiter = RateLimiter::new(bucket_config(10.0, 1));

        assert!(limiter.try_acquire());
        // The next token is ~100ms away; a 500ms budget covers it.
        assert!(limiter.acquire(Some(Duration::from_millis(500))));
    }

    #[test]
    fn test_acquire_times_out_promptly() {
        let limiter = RateLimiter::new(bucket_config(0.5, 1));
        assert!(limiter.try_acquire());

        // The next token is ~2s away; a 100ms budget cannot cover it.
        let start = Instant::now();
        assert!(!limiter.acquire(Some(Duration::from_millis(100))));
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(400),
            "timeout overshot: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_counters_track_attempts_and_rejections() {
        let limiter = RateLimiter::new(bucket_config(1.0, 1));

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());

        let status = limiter.status();
        assert_eq!(status.total_requests, 3);
        assert_eq!(status.rejected_requests, 2);
        assert!(status.rejected_requests <= status.total_requests);
    }

    #[test]
    fn test_waiting_acquire_counts_once() {
        let limiter = RateLimiter::new(bucket_config(20.0, 1));

        assert!(limiter.try_acquire());
        // Internally retries several times, but counts as one attempt.
        assert!(limiter.acquire(Some(Duration::from_millis(500))));

        let status = limiter.status();
        assert_eq!(status.total_requests, 2);
        assert_eq!(status.rejected_requests, 0);
    }

    #[test]
    fn test_sliding_window_strategy() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 2.0,
            window_size: Duration::from_secs(1),
            strategy: Strategy::SlidingWindow,
            ..RateLimitConfig::default()
        });

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_record_response_is_noop_for_fixed_strategies() {
        let limiter = RateLimiter::new(bucket_config(1.0, 1));
        limiter.record_response(false, Duration::from_secs(9));
        limiter.record_error(ErrorKind::RateLimited);
        assert_eq!(limiter.status().current_rate, 1.0);
    }

    #[test]
    fn test_adaptive_throttle_feedback_lowers_rate() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 10.0,
            burst_size: 10,
            strategy: Strategy::Adaptive,
            adaptive_min: 1.0,
            adaptive_max: 20.0,
            ..RateLimitConfig::default()
        });

        assert_eq!(limiter.status().current_rate, 10.0);
        limiter.record_error(ErrorKind::RateLimited);
        assert_eq!(limiter.status().current_rate, 5.0);
    }

    #[test]
    fn test_reset_restores_baseline() {
        let limiter = RateLimiter::new(bucket_config(1.0, 2));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.reset();
        let status = limiter.status();
        assert_eq!(status.total_requests, 0);
        assert_eq!(status.rejected_requests, 0);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_concurrent_acquire_respects_capacity() {
        let limiter = Arc::new(RateLimiter::new(bucket_config(0.001, 10)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                let mut granted = 0u32;
                for _ in 0..5 {
                    if limiter.try_acquire() {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 40 attempts against 10 tokens and a negligible refill rate.
        assert!(granted <= 10, "over-admitted: {}", granted);

        let status = limiter.status();
        assert_eq!(status.total_requests, 40);
        assert_eq!(status.rejected_requests, 40 - u64::from(granted));
    }
}
