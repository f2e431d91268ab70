// src/cache/rate_limit.rs

//! Retry delays for the work queue
//!
//! The default limiter combines per-key exponential backoff with a shared
//! token bucket and uses whichever delay is longer.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Decides how long a key waits before it is retried
pub trait RateLimiter: Send + Sync {
    /// Delay for the next retry of `item`; records the retry
    fn when(&self, item: &str) -> Duration;

    /// Clear the retry history of `item`
    fn forget(&self, item: &str);

    /// Retries recorded for `item` since it was last forgotten
    fn num_requeues(&self, item: &str) -> u32;
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
pub struct ItemExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ItemExponentialBackoff {
    fn when(&self, item: &str) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(item.to_string()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        let backoff = self.base.as_secs_f64() * 2f64.powi(exponent.min(i32::MAX as u32) as i32);
        if !backoff.is_finite() || backoff >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(backoff)
    }

    fn forget(&self, item: &str) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(&self, item: &str) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Shared token bucket: `rate` tokens per second, holding at most `burst`
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for TokenBucket {
    fn when(&self, _item: &str) -> Duration {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last = now;

        // Reserve a token even when the bucket is empty; the deficit is the wait
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    fn forget(&self, _item: &str) {}

    fn num_requeues(&self, _item: &str) -> u32 {
        0
    }
}

/// Longest delay of several limiters
pub struct MaxOf {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOf {
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOf {
    fn when(&self, item: &str) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, item: &str) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &str) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// 5ms doubling backoff capped at 1000s, combined with 10 retries/s (burst 100)
pub fn default_rate_limiter() -> MaxOf {
    MaxOf::new(vec![
        Box::new(ItemExponentialBackoff::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        )),
        Box::new(TokenBucket::new(10.0, 100)),
    ])
}
