//! Error classification and recovery
//!
//! [`ErrorClassifier`] maps an upstream failure kind to a severity and a
//! recovery strategy; [`RecoveryEngine`] executes the strategy and reports
//! what the caller should do next in a [`RecoveryResult`]. Every handled
//! error is also appended to a bounded history and counted per kind and
//! per severity, so a metrics surface can read failure shape at any time.
//!
//! The engine never raises: retry-style strategies return a non-raising
//! failure (`should_retry()` true), fail-fast and exhausted retries wrap
//! the original error for the caller to re-raise, and fallback/degrade
//! absorb the failure into a substitute success flagged as degraded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{ErrorKind, GuardError, Severity};

/// How the engine responds to a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStrategy {
    /// Tell the caller to try again, up to `max_retries` times
    Retry,
    /// Substitute a registered per-operation fallback value
    Fallback,
    /// Succeed with an empty value, flagged as degraded
    Degrade,
    /// Consult the named circuit breaker before permitting a retry
    CircuitBreak,
    /// Wrap and surface the original error unchanged
    FailFast,
}

/// Overridable kind → severity and kind → strategy tables.
///
/// Defaults: auth and permission failures are critical and fail fast;
/// connectivity failures are high-severity and retried; validation and
/// lookup failures are medium; everything else is low.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    severities: HashMap<ErrorKind, Severity>,
    strategies: HashMap<ErrorKind, RecoveryStrategy>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        let severities = HashMap::from([
            (ErrorKind::Auth, Severity::Critical),
            (ErrorKind::Permission, Severity::Critical),
            (ErrorKind::Connection, Severity::High),
            (ErrorKind::Timeout, Severity::High),
            (ErrorKind::RateLimited, Severity::Medium),
            (ErrorKind::Validation, Severity::Medium),
            (ErrorKind::NotFound, Severity::Medium),
            (ErrorKind::Data, Severity::Low),
            (ErrorKind::Internal, Severity::Low),
        ]);
        let strategies = HashMap::from([
            (ErrorKind::Auth, RecoveryStrategy::FailFast),
            (ErrorKind::Permission, RecoveryStrategy::FailFast),
            (ErrorKind::Connection, RecoveryStrategy::Retry),
            (ErrorKind::Timeout, RecoveryStrategy::Retry),
            (ErrorKind::RateLimited, RecoveryStrategy::Retry),
            (ErrorKind::Validation, RecoveryStrategy::FailFast),
            (ErrorKind::NotFound, RecoveryStrategy::Fallback),
            (ErrorKind::Data, RecoveryStrategy::Degrade),
            (ErrorKind::Internal, RecoveryStrategy::CircuitBreak),
        ]);
        Self {
            severities,
            strategies,
        }
    }
}

impl ErrorClassifier {
    /// Severity for a kind; unmapped kinds are low-severity.
    pub fn severity(&self, kind: ErrorKind) -> Severity {
        self.severities.get(&kind).copied().unwrap_or(Severity::Low)
    }

    /// Strategy for a kind; unmapped kinds fail fast.
    pub fn strategy(&self, kind: ErrorKind) -> RecoveryStrategy {
        self.strategies
            .get(&kind)
            .copied()
            .unwrap_or(RecoveryStrategy::FailFast)
    }

    /// Override the severity for a kind.
    pub fn set_severity(&mut self, kind: ErrorKind, severity: Severity) {
        self.severities.insert(kind, severity);
    }

    /// Override the strategy for a kind.
    pub fn set_strategy(&mut self, kind: ErrorKind, strategy: RecoveryStrategy) {
        self.strategies.insert(kind, strategy);
    }
}

/// Immutable record of one handled failure.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Classified upstream kind
    pub kind: ErrorKind,

    /// Severity assigned by the classifier
    pub severity: Severity,

    /// The operation that failed
    pub operation: String,

    /// The error's display message
    pub message: String,

    /// When the failure was handled
    pub timestamp: SystemTime,

    /// How many retries the caller had already made
    pub retry_count: u32,

    /// The engine's retry budget at the time
    pub max_retries: u32,
}

/// What a recovery attempt produced and what the caller should do next.
#[derive(Debug)]
pub struct RecoveryResult<V> {
    /// Whether the failure was absorbed into a usable outcome
    pub success: bool,

    /// Substitute value, when one exists
    pub value: Option<V>,

    /// The strategy that was executed
    pub strategy: RecoveryStrategy,

    /// Human-readable account of what happened
    pub message: String,

    /// Whether the outcome is a substitute rather than a genuine success
    pub degraded: bool,

    /// Error to surface, when recovery did not absorb the failure
    pub error: Option<GuardError>,
}

impl<V> RecoveryResult<V> {
    /// Whether the caller is expected to retry the operation.
    ///
    /// True exactly for the non-raising failures: a retry with budget left,
    /// or a circuit-break check that found the breaker willing.
    pub fn should_retry(&self) -> bool {
        !self.success && self.error.is_none()
    }
}

/// Aggregate failure counters.
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    /// Every failure handled since creation
    pub total_errors: u64,

    /// History entries discarded to stay within capacity
    pub dropped_from_history: u64,

    /// Failures per upstream kind
    pub by_kind: HashMap<ErrorKind, u64>,

    /// Failures per assigned severity
    pub by_severity: HashMap<Severity, u64>,
}

/// Settings for a [`RecoveryEngine`].
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Retry budget communicated to callers
    pub max_retries: u32,

    /// Bounded error-history capacity; oldest entries drop first
    pub history_capacity: usize,

    /// Configuration for breakers the engine creates lazily
    pub breaker_defaults: CircuitBreakerConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            history_capacity: 256,
            breaker_defaults: CircuitBreakerConfig::default(),
        }
    }
}

/// History and counters share one lock: appends and reads are serialized.
#[derive(Debug)]
struct Journal {
    history: VecDeque<ErrorContext>,
    capacity: usize,
    stats: ErrorStats,
}

impl Journal {
    fn record(&mut self, context: ErrorContext) {
        self.stats.total_errors += 1;
        *self.stats.by_kind.entry(context.kind).or_insert(0) += 1;
        *self.stats.by_severity.entry(context.severity).or_insert(0) += 1;

        if self.history.len() >= self.capacity {
            self.history.pop_front();
            self.stats.dropped_from_history += 1;
        }
        self.history.push_back(context);
    }
}

type FallbackFn<V> = Box<dyn Fn() -> V + Send + Sync>;

/// Classifies failures and executes recovery strategies.
///
/// Generic over the caller's value type `V`: fallback closures produce a
/// `V`, and degrade produces an empty (`None`) value. Registration happens
/// at the composition root before the engine is shared; handling takes
/// `&self` and is safe from any thread.
pub struct RecoveryEngine<V> {
    classifier: ErrorClassifier,
    config: RecoveryConfig,
    fallbacks: HashMap<String, FallbackFn<V>>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    journal: Mutex<Journal>,
}

impl<V> RecoveryEngine<V> {
    /// Create an engine with the default classifier.
    pub fn new(config: RecoveryConfig) -> Self {
        Self::with_classifier(ErrorClassifier::default(), config)
    }

    /// Create an engine with a customized classifier.
    pub fn with_classifier(classifier: ErrorClassifier, config: RecoveryConfig) -> Self {
        Self {
            classifier,
            journal: Mutex::new(Journal {
                history: VecDeque::with_capacity(config.history_capacity.min(1024)),
                capacity: config.history_capacity.max(1),
                stats: ErrorStats::default(),
            }),
            config,
            fallbacks: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fallback value source for an operation.
    pub fn register_fallback<F>(&mut self, operation: impl Into<String>, fallback: F)
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        self.fallbacks.insert(operation.into(), Box::new(fallback));
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Return the breaker named `name`, creating it on first access from
    /// the engine's breaker defaults.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                name,
                self.config.breaker_defaults.clone(),
            ))
        }))
    }

    /// Classify `error` and execute the mapped recovery strategy.
    ///
    /// `retry_count` is how many retries the caller has already made for
    /// this operation; the engine compares it against its retry budget but
    /// never sleeps or re-invokes anything itself.
    pub fn handle_error(
        &self,
        error: GuardError,
        operation: &str,
        retry_count: u32,
    ) -> RecoveryResult<V> {
        let kind = error.kind().unwrap_or(ErrorKind::Internal);
        let severity = self.classifier.severity(kind);
        let strategy = self.classifier.strategy(kind);

        self.journal.lock().unwrap().record(ErrorContext {
            kind,
            severity,
            operation: operation.to_string(),
            message: error.to_string(),
            timestamp: SystemTime::now(),
            retry_count,
            max_retries: self.config.max_retries,
        });

        tracing::debug!(
            operation,
            kind = %kind,
            severity = %severity,
            ?strategy,
            retry_count,
            "handling error"
        );

        match strategy {
            RecoveryStrategy::Retry => self.handle_retry(operation, retry_count),
            RecoveryStrategy::Fallback => self.handle_fallback(operation),
            RecoveryStrategy::Degrade => RecoveryResult {
                success: true,
                value: None,
                strategy,
                message: format!("degraded: returning empty result for '{}'", operation),
                degraded: true,
                error: None,
            },
            RecoveryStrategy::CircuitBreak => self.handle_circuit_break(operation),
            RecoveryStrategy::FailFast => RecoveryResult {
                success: false,
                value: None,
                strategy,
                message: format!("failing fast for '{}'", operation),
                degraded: false,
                error: Some(error),
            },
        }
    }

    /// Counter snapshot; never blocks behind strategy execution.
    pub fn error_stats(&self) -> ErrorStats {
        self.journal.lock().unwrap().stats.clone()
    }

    /// Snapshot of the bounded error history, oldest first.
    pub fn history(&self) -> Vec<ErrorContext> {
        self.journal.lock().unwrap().history.iter().cloned().collect()
    }

    fn handle_retry(&self, operation: &str, retry_count: u32) -> RecoveryResult<V> {
        if retry_count < self.config.max_retries {
            RecoveryResult {
                success: false,
                value: None,
                strategy: RecoveryStrategy::Retry,
                message: format!(
                    "retry {}/{} for '{}'",
                    retry_count + 1,
                    self.config.max_retries,
                    operation
                ),
                degraded: false,
                error: None,
            }
        } else {
            RecoveryResult {
                success: false,
                value: None,
                strategy: RecoveryStrategy::Retry,
                message: format!("max retries exceeded for '{}'", operation),
                degraded: false,
                error: Some(GuardError::RetriesExhausted {
                    attempts: retry_count,
                }),
            }
        }
    }

    fn handle_fallback(&self, operation: &str) -> RecoveryResult<V> {
        match self.fallbacks.get(operation) {
            Some(fallback) => RecoveryResult {
                success: true,
                value: Some(fallback()),
                strategy: RecoveryStrategy::Fallback,
                message: format!("fallback value substituted for '{}'", operation),
                degraded: true,
                error: None,
            },
            None => RecoveryResult {
                success: false,
                value: None,
                strategy: RecoveryStrategy::Fallback,
                message: format!("no fallback available for '{}'", operation),
                degraded: false,
                error: Some(GuardError::NoFallback {
                    operation: operation.to_string(),
                }),
            },
        }
    }

    /// Consult (but never trip) the operation's breaker. Failures observed
    /// here were not seen by a `call` wrapper, so they do not count toward
    /// that breaker's threshold.
    fn handle_circuit_break(&self, operation: &str) -> RecoveryResult<V> {
        let breaker = self.breaker(operation);
        if breaker.is_call_permitted() {
            RecoveryResult {
                success: false,
                value: None,
                strategy: RecoveryStrategy::CircuitBreak,
                message: format!("circuit '{}' permits a retry", operation),
                degraded: false,
                error: None,
            }
        } else {
            RecoveryResult {
                success: false,
                value: None,
                strategy: RecoveryStrategy::CircuitBreak,
                message: format!("circuit '{}' is open", operation),
                degraded: false,
                error: Some(GuardError::CircuitOpen {
                    name: operation.to_string(),
                }),
            }
        }
    }
}
