//! Shared admission types
//!
//! Both admission primitives answer the same question: may this request
//! proceed now, and if not, how long until it could? [`Decision`] carries
//! that answer.

use std::time::Duration;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// The request may proceed.
    Granted,

    /// The request was rejected.
    Rejected {
        /// Non-binding hint: how long until a slot could become available.
        ///
        /// `None` means the limiter can never admit this request (a zero
        /// refill rate with an empty bucket, or a zero-capacity window).
        retry_after: Option<Duration>,
    },
}

impl Decision {
    /// Whether the request was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }

    /// The wait hint for a rejected request, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Granted => None,
            Decision::Rejected { retry_after } => *retry_after,
        }
    }
}
