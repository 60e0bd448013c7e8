//! Multi-tenant limiter registry
//!
//! One [`RateLimiter`] per key, created lazily from a shared default
//! configuration. Keys are typically `{service}_{endpoint}` so endpoints
//! are limited independently. The registry-wide lock is only taken in
//! write mode on the create path; once a limiter exists it is touched
//! solely through its own lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::error::ErrorKind;
use crate::rate_limiter::{LimiterStatus, RateLimiter};

/// Lazily populated key → limiter map.
#[derive(Debug)]
pub struct LimiterRegistry {
    config: Arc<RateLimitConfig>,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    /// Create an empty registry; every limiter it creates shares `config`.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Return the limiter for `key`, creating it on first access.
    ///
    /// Concurrent first accesses for one key all observe the same instance:
    /// the losing writers land on the entry the winner inserted.
    pub fn get_or_create(&self, key: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.read().unwrap().get(key) {
            return Arc::clone(limiter);
        }

        let mut limiters = self.limiters.write().unwrap();
        Arc::clone(
            limiters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::with_shared(Arc::clone(&self.config)))),
        )
    }

    /// Look up an existing limiter without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.read().unwrap().get(key).cloned()
    }

    /// Admit one request for `key`, waiting up to `timeout`.
    pub fn acquire(&self, key: &str, timeout: Option<Duration>) -> bool {
        self.get_or_create(key).acquire(timeout)
    }

    /// Feed a call outcome back to the limiter for `key`.
    pub fn record_response(&self, key: &str, success: bool, elapsed: Duration) {
        self.get_or_create(key).record_response(success, elapsed);
    }

    /// Feed an explicitly classified failure back to the limiter for `key`.
    pub fn record_error(&self, key: &str, kind: ErrorKind) {
        self.get_or_create(key).record_error(kind);
    }

    /// Snapshot every limiter's status, keyed by tenant.
    pub fn all_status(&self) -> Vec<(String, LimiterStatus)> {
        let limiters = self.limiters.read().unwrap();
        limiters
            .iter()
            .map(|(key, limiter)| (key.clone(), limiter.status()))
            .collect()
    }

    /// Drop the limiter for `key`, if present.
    pub fn remove(&self, key: &str) {
        self.limiters.write().unwrap().remove(key);
    }

    /// Number of limiters created so far.
    pub fn len(&self) -> usize {
        self.limiters.read().unwrap().len()
    }

    /// Whether no limiter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.limiters.read().unwrap().is_empty()
    }

    /// The shared default configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
