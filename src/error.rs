//! Error types for callguard
//!
//! Three failure families flow through this crate, and callers can always
//! tell them apart:
//!
//! - [`GuardError::RateLimitExceeded`]: admission control rejected the call
//!   locally; the remote dependency was never contacted
//! - [`GuardError::CircuitOpen`]: a breaker refused the call while its
//!   dependency cools down; the remote dependency was never contacted
//! - [`GuardError::Upstream`]: the dependency was called and failed, with a
//!   classified [`ErrorKind`]

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardError>;

/// Kind of an upstream (dependency) failure.
///
/// A closed set: the classification and recovery tables key off these
/// variants, with a registration API for overriding the defaults per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Authentication failed (bad or expired credentials)
    Auth,

    /// Authenticated but not allowed to perform the operation
    Permission,

    /// Could not reach the dependency (DNS failure, refused, reset)
    Connection,

    /// The dependency did not answer in time
    Timeout,

    /// The dependency throttled us (HTTP 429 and friends)
    RateLimited,

    /// The request was rejected as malformed
    Validation,

    /// The requested entity does not exist
    NotFound,

    /// The response arrived but could not be decoded
    Data,

    /// The dependency reported an internal fault (HTTP 5xx and friends)
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Data => "data",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// How serious a classified failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        };
        write!(f, "{}", name)
    }
}

/// Errors produced or wrapped by the resilience primitives.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Local admission control rejected the call before it was attempted.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// A circuit breaker refused the call while its dependency cools down.
    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    /// The dependency was called and failed.
    #[error("{kind} error: {message}")]
    Upstream { kind: ErrorKind, message: String },

    /// A retrying recovery gave up.
    #[error("max retries exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A fallback recovery was requested but none is registered.
    #[error("no fallback available for operation '{operation}'")]
    NoFallback { operation: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GuardError {
    /// Wrap a classified dependency failure.
    pub fn upstream(kind: ErrorKind, message: impl Into<String>) -> Self {
        GuardError::Upstream {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an upstream timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::upstream(ErrorKind::Timeout, message)
    }

    /// Shorthand for an upstream connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::upstream(ErrorKind::Connection, message)
    }

    /// Shorthand for an upstream throttle response.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::upstream(ErrorKind::RateLimited, message)
    }

    /// The upstream kind, if this error came from the dependency.
    ///
    /// Local errors (rate limit, open circuit, configuration) have no
    /// upstream kind and return `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GuardError::Upstream { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying could plausibly succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            Some(
                ErrorKind::Connection
                    | ErrorKind::Timeout
                    | ErrorKind::RateLimited
                    | ErrorKind::Internal
            )
        )
    }

    /// Whether this error is an upstream throttle signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self.kind(), Some(ErrorKind::RateLimited))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_kind() {
        let err = GuardError::timeout("no answer in 5s");
        assert_eq!(err.kind(), Some(ErrorKind::Timeout));
        assert!(err.is_transient());
    }

    #[test]
    fn test_local_errors_have_no_kind() {
        assert_eq!(GuardError::RateLimitExceeded.kind(), None);
        let err = GuardError::CircuitOpen {
            name: "billing".to_string(),
        };
        assert_eq!(err.kind(), None);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(GuardError::rate_limited("429").is_rate_limit());
        assert!(!GuardError::connection("refused").is_rate_limit());
        assert!(!GuardError::RateLimitExceeded.is_rate_limit());
    }

    #[test]
    fn test_display_messages() {
        let err = GuardError::upstream(ErrorKind::Auth, "token expired");
        assert_eq!(err.to_string(), "auth error: token expired");

        let err = GuardError::CircuitOpen {
            name: "search".to_string(),
        };
        assert_eq!(err.to_string(), "circuit 'search' is open");

        let err = GuardError::NoFallback {
            operation: "get_user".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no fallback available for operation 'get_user'"
        );
    }

    #[test]
    fn test_permanent_kinds_are_not_transient() {
        for kind in [
            ErrorKind::Auth,
            ErrorKind::Permission,
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Data,
        ] {
            assert!(
                !GuardError::upstream(kind, "x").is_transient(),
                "{} should not be transient",
                kind
            );
        }
    }
}
