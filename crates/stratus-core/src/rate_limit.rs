//! Sliding-window rate limiting.
//!
//! A [`RateLimiter`] keeps, per bucket key, the instants of the calls it
//! admitted during the last window. A call is allowed while fewer than
//! `max_requests` admissions remain inside the window. Denied calls are
//! never queued: the caller gets the time until the oldest admission ages
//! out and must surface a rate-limited failure.
//!
//! The engine uses one global bucket for outbound provider calls; the HTTP
//! boundary uses one bucket per client address.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Budget for one limiter: `max_requests` admissions per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Admissions allowed per window. Zero denies everything.
    pub max_requests: u32,
    /// Length of the sliding window.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a budget.
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Default outbound provider budget: 50 calls per minute.
    pub const fn outbound_default() -> Self {
        Self::new(50, Duration::from_secs(60))
    }

    /// Default inbound budget per client: 120 requests per minute.
    pub const fn inbound_default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::outbound_default()
    }
}

/// Keyed sliding-window log limiter.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stratus_core::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));
/// assert!(limiter.allow(&"provider"));
/// assert!(limiter.allow(&"provider"));
/// assert!(!limiter.allow(&"provider"));
/// assert!(limiter.allow(&"other"));
/// ```
#[derive(Debug)]
pub struct RateLimiter<K> {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create a limiter with the given budget.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The configured budget.
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Whether a call for `key` is admitted now.
    pub fn allow(&self, key: &K) -> bool {
        self.check(key).is_ok()
    }

    /// Admit a call for `key`, or return how long until one would be admitted.
    pub fn check(&self, key: &K) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    /// Like [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, key: &K, now: Instant) -> Result<(), Duration> {
        self.check_many_at(key, 1, now)
    }

    /// Admit `cost` calls for `key` at once, or none of them.
    ///
    /// A cost larger than the whole budget is never admitted; the wait
    /// reported for it is one full window.
    pub fn check_many(&self, key: &K, cost: u32) -> Result<(), Duration> {
        self.check_many_at(key, cost, Instant::now())
    }

    /// Like [`check_many`](Self::check_many) with an explicit clock reading.
    pub fn check_many_at(&self, key: &K, cost: u32, now: Instant) -> Result<(), Duration> {
        let RateLimitConfig {
            max_requests,
            window,
        } = self.config;
        if max_requests == 0 || cost > max_requests {
            return Err(window);
        }

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let log = buckets.entry(key.clone()).or_default();

        while log
            .front()
            .is_some_and(|admitted| now.saturating_duration_since(*admitted) >= window)
        {
            log.pop_front();
        }

        let (cost, max) = (cost as usize, max_requests as usize);
        if log.len() + cost <= max {
            log.extend(std::iter::repeat_n(now, cost));
            return Ok(());
        }

        // The admissions that must age out before `cost` more fit.
        let blocking = log.len() + cost - max;
        let until = log.get(blocking - 1).copied().unwrap_or(now);
        Err(window.saturating_sub(now.saturating_duration_since(until)))
    }

    /// Admissions still available for `key` in the current window.
    pub fn remaining(&self, key: &K) -> u32 {
        let now = Instant::now();
        let window = self.config.window;
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let used = buckets.get(key).map_or(0, |log| {
            log.iter()
                .filter(|admitted| now.saturating_duration_since(**admitted) < window)
                .count()
        });
        self.config
            .max_requests
            .saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Drop buckets with no admissions inside the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.retain(|_, log| {
            log.back()
                .is_some_and(|latest| now.saturating_duration_since(*latest) < window)
        });
    }

    /// Number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
