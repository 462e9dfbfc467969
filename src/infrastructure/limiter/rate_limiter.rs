use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::repositories::throttle::{RequestThrottle, ThrottleDecision};

/// A token bucket which allows fractional tokens for precise refill
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Small epsilon to avoid fp surprises
    fn try_consume(&mut self, amount: f64) -> bool {
        self.refill();
        if self.tokens + 1e-12 >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> f64 {
        self.tokens
    }
}

/// Sliding window counter, weighted by how far into the current window we are.
#[derive(Debug)]
pub struct SlidingWindow {
    window_size: Duration,
    limit: u64,
    current_window_start: Instant,
    current_count: u64,
    prev_count: u64,
}

impl SlidingWindow {
    fn new(window_size: Duration, limit: u64) -> Self {
        Self {
            window_size,
            limit,
            current_window_start: Instant::now(),
            current_count: 0,
            prev_count: 0,
        }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let mut elapsed = now.duration_since(self.current_window_start);

        if elapsed >= self.window_size {
            self.prev_count = if elapsed >= self.window_size * 2 { 0 } else { self.current_count };
            self.current_count = 0;
            self.current_window_start = now;
            elapsed = Duration::ZERO;
        }

        let weight = elapsed.as_secs_f64() / self.window_size.as_secs_f64();
        let effective = (self.prev_count as f64) * (1.0 - weight) + (self.current_count as f64);

        if effective < self.limit as f64 {
            self.current_count += 1;
            true
        } else {
            false
        }
    }
}

/// Token bucket first, sliding window as overflow.
#[derive(Debug)]
struct HybridLimiter {
    bucket: TokenBucket,
    window: SlidingWindow,
    last_seen: Instant,
}

impl HybridLimiter {
    fn new(capacity: f64, refill_per_sec: f64, window_size: Duration, limit: u64) -> Self {
        Self {
            bucket: TokenBucket::new(capacity, refill_per_sec),
            window: SlidingWindow::new(window_size, limit),
            last_seen: Instant::now(),
        }
    }

    fn check(&mut self) -> ThrottleDecision {
        self.last_seen = Instant::now();
        if self.bucket.try_consume(1.0) || self.window.allow() {
            return ThrottleDecision { allowed: true, retry_after: None };
        }

        // Seconds until the next whole token
        let tokens_needed = 1.0 - self.bucket.remaining();
        let retry_after = if tokens_needed > 0.0 {
            ((tokens_needed / self.bucket.refill_per_sec).ceil() as u64).max(1)
        } else {
            1
        };
        ThrottleDecision { allowed: false, retry_after: Some(retry_after) }
    }
}

type Key = String;

/// Per-key rate limiter store. Idle keys are evicted after `bucket_ttl`.
#[derive(Clone)]
pub struct RateLimiterStore {
    map: Arc<DashMap<Key, Arc<Mutex<HybridLimiter>>>>,
    capacity: f64,
    refill_per_sec: f64,
    window_size: Duration,
    window_limit: u64,
}

impl RateLimiterStore {
    pub fn new(capacity: f64, refill_per_sec: f64, window_size: Duration, window_limit: u64) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            capacity,
            refill_per_sec,
            window_size,
            window_limit,
        }
    }

    /// Spawns the eviction task on the current tokio runtime.
    pub fn with_eviction(self, bucket_ttl: Duration) -> Self {
        let map = self.map.clone();
        tokio::spawn(async move {
            let interval = Duration::from_secs(30);
            loop {
                sleep(interval).await;
                let now = Instant::now();
                map.retain(|_, limiter| now.duration_since(limiter.lock().last_seen) <= bucket_ttl);
            }
        });
        self
    }

    fn get_limiter(&self, key: &str) -> Arc<Mutex<HybridLimiter>> {
        if let Some(existing) = self.map.get(key) {
            return existing.clone();
        }
        self.map
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HybridLimiter::new(
                    self.capacity,
                    self.refill_per_sec,
                    self.window_size,
                    self.window_limit,
                )))
            })
            .clone()
    }

    pub fn tracked_keys(&self) -> usize {
        self.map.len()
    }
}

impl RequestThrottle for RateLimiterStore {
    fn check(&self, key: &str) -> ThrottleDecision {
        let limiter = self.get_limiter(key);
        let mut limiter = limiter.lock();
        limiter.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_up_to_capacity_then_window() {
        let store = RateLimiterStore::new(3.0, 0.001, Duration::from_secs(60), 2);

        let allowed = (0..10).filter(|_| store.check("user-a").allowed).count();
        assert_eq!(allowed, 5);

        let denied = store.check("user-a");
        assert!(!denied.allowed);
        assert!(denied.retry_after.unwrap() >= 1);
    }

    #[test]
    fn keys_are_independent() {
        let store = RateLimiterStore::new(1.0, 0.001, Duration::from_secs(60), 0);
        assert!(store.check("user-a").allowed);
        assert!(!store.check("user-a").allowed);
        assert!(store.check("user-b").allowed);
        assert_eq!(store.tracked_keys(), 2);
    }

    #[test]
    fn tokens_refill_over_time() {
        let store = RateLimiterStore::new(1.0, 20.0, Duration::from_secs(60), 0);
        assert!(store.check("k").allowed);
        assert!(!store.check("k").allowed);
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.check("k").allowed);
    }
}
