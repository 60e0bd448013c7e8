//! Sliding window admission primitive
//!
//! Counts discrete events in a trailing interval. Timestamps arrive in
//! non-decreasing order, so expiry only ever removes a prefix of the queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::Decision;

/// Trailing-interval event counter.
///
/// Never holds a timestamp older than `now - window`.
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    max_requests: usize,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Create a window admitting `max_requests` events per `window`.
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            timestamps: VecDeque::with_capacity(max_requests.min(1024)),
        }
    }

    /// Trim expired timestamps, then try to admit one event.
    ///
    /// A zero-length window admits everything without recording; a
    /// zero-capacity window rejects everything with no hint.
    pub fn allow(&mut self) -> Decision {
        let now = Instant::now();
        self.trim(now);

        if self.window.is_zero() {
            return Decision::Granted;
        }
        if self.max_requests == 0 {
            return Decision::Rejected { retry_after: None };
        }

        if self.timestamps.len() < self.max_requests {
            self.timestamps.push_back(now);
            return Decision::Granted;
        }

        // Full: the oldest entry leaving the window frees the next slot.
        let oldest = self.timestamps[0];
        let wait = self.window.saturating_sub(now.duration_since(oldest));
        Decision::Rejected {
            retry_after: Some(wait),
        }
    }

    /// Number of events still inside the window, without admitting one.
    pub fn current_count(&mut self) -> usize {
        self.trim(Instant::now());
        self.timestamps.len()
    }

    /// The configured per-window capacity.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// The trailing window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Forget all recorded events.
    pub fn clear(&mut self) {
        self.timestamps.clear();
    }

    fn trim(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}
