//! Admission-control integration scenarios: burst, recovery over time,
//! per-tenant isolation, and the cooperative gate.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use callguard::async_gate::{AsyncGate, AsyncGateConfig};
use callguard::config::{RateLimitConfig, Strategy};
use callguard::error::ErrorKind;
use callguard::rate_limiter::RateLimiter;
use callguard::registry::LimiterRegistry;

fn token_bucket_config(rps: f64, burst: u32) -> RateLimitConfig {
    RateLimitConfig {
        requests_per_second: rps,
        burst_size: burst,
        strategy: Strategy::TokenBucket,
        ..RateLimitConfig::default()
    }
}

#[test]
fn test_burst_exhaustion_and_replenishment() {
    let limiter = RateLimiter::new(token_bucket_config(2.0, 2));

    // Two immediate admissions cover the burst.
    assert!(limiter.acquire(None));
    assert!(limiter.acquire(None));

    // The third is rejected outright.
    assert!(!limiter.acquire(None));

    // Half a second at 2 req/s replenishes one token.
    thread::sleep(Duration::from_millis(500));
    assert!(limiter.acquire(None));
}

#[test]
fn test_timeout_is_a_hard_deadline() {
    let limiter = RateLimiter::new(token_bucket_config(0.2, 1));
    assert!(limiter.acquire(None));

    // The next token is ~5s away; a 150ms budget must fail fast.
    let start = Instant::now();
    assert!(!limiter.acquire(Some(Duration::from_millis(150))));
    assert!(start.elapsed() < Duration::from_millis(500));

    let status = limiter.status();
    assert_eq!(status.total_requests, 2);
    assert_eq!(status.rejected_requests, 1);
}

#[test]
fn test_waiting_callers_are_admitted_when_tokens_arrive() {
    let limiter = Arc::new(RateLimiter::new(token_bucket_config(10.0, 1)));
    assert!(limiter.acquire(None));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let limiter = Arc::clone(&limiter);
        handles.push(thread::spawn(move || {
            limiter.acquire(Some(Duration::from_secs(2)))
        }));
    }

    // At 10 req/s all three waiters fit comfortably into the 2s budget.
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_tenants_are_throttled_independently() {
    let registry = LimiterRegistry::new(token_bucket_config(1.0, 1));

    assert!(registry.acquire("orders_create", None));
    assert!(!registry.acquire("orders_create", None));

    // Draining one endpoint leaves the others untouched.
    assert!(registry.acquire("orders_list", None));
    assert!(registry.acquire("billing_charge", None));

    let statuses = registry.all_status();
    assert_eq!(statuses.len(), 3);
    let rejected: u64 = statuses.iter().map(|(_, s)| s.rejected_requests).sum();
    assert_eq!(rejected, 1);
}

#[test]
fn test_concurrent_tenant_creation_yields_one_limiter() {
    let registry = Arc::new(LimiterRegistry::new(token_bucket_config(5.0, 5)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            registry.get_or_create("fresh_key")
        }));
    }

    let limiters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for limiter in &limiters[1..] {
        assert!(Arc::ptr_eq(&limiters[0], limiter));
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_adaptive_limiter_tightens_after_throttle_signal() {
    let registry = LimiterRegistry::new(RateLimitConfig {
        requests_per_second: 8.0,
        burst_size: 8,
        strategy: Strategy::Adaptive,
        adaptive_min: 2.0,
        adaptive_max: 16.0,
        ..RateLimitConfig::default()
    });

    assert_eq!(registry.get_or_create("api_fetch").status().current_rate, 8.0);

    // Two upstream 429s: 8 → 4 → 2, floored at adaptive_min thereafter.
    registry.record_error("api_fetch", ErrorKind::RateLimited);
    registry.record_error("api_fetch", ErrorKind::RateLimited);
    registry.record_error("api_fetch", ErrorKind::RateLimited);

    let status = registry.get_or_create("api_fetch").status();
    assert_eq!(status.current_rate, 2.0);
}

#[tokio::test]
async fn test_async_gate_admission_flow() {
    let gate = AsyncGate::new(AsyncGateConfig {
        requests_per_second: 1000.0,
        burst_size: 2,
        max_in_flight: Some(2),
    });

    let first = gate.admit_timeout(Duration::from_millis(100)).await.unwrap();
    let second = gate.admit_timeout(Duration::from_millis(100)).await.unwrap();
    assert_eq!(gate.available_slots(), Some(0));

    drop(first);
    drop(second);
    assert_eq!(gate.available_slots(), Some(2));
}
