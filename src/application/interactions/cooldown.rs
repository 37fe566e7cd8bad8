//! Token-bucket cooldowns keyed by caller-supplied strings
//!
//! Refill is lazy: tokens are recomputed from elapsed time on every check,
//! there is no background timer.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// State of one bucket
#[derive(Debug, Clone, Copy)]
pub struct Bucket {
    pub capacity: f64,
    pub tokens: f64,
    pub last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// Cooldown policy: burst capacity and refill rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl CooldownPolicy {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec,
        }
    }

    /// `uses` calls per `per` window
    pub fn per(uses: u32, per: Duration) -> Self {
        Self::new(uses, f64::from(uses) / per.as_secs_f64().max(f64::EPSILON))
    }
}

/// Shared set of cooldown buckets
pub struct CooldownBuckets {
    buckets: DashMap<String, Bucket>,
}

impl CooldownBuckets {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `key`, or report how long until one is available
    pub fn try_acquire(&self, key: &str, policy: CooldownPolicy) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            capacity: policy.capacity,
            tokens: policy.capacity,
            last_refill: now,
        });
        bucket.capacity = policy.capacity;
        bucket.refill(policy.refill_per_sec, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else if policy.refill_per_sec > 0.0 {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::try_from_secs_f64(missing / policy.refill_per_sec).unwrap_or(Duration::MAX))
        } else {
            Err(Duration::MAX)
        }
    }

    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Drop buckets that have refilled to capacity
    pub fn prune(&self, refill_per_sec: f64) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, b| {
            let mut probe = *b;
            probe.refill(refill_per_sec, now);
            probe.tokens < probe.capacity
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for CooldownBuckets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn capacity_two_refill_half_per_second() {
        let buckets = CooldownBuckets::new();
        let policy = CooldownPolicy::new(2, 0.5);

        assert!(buckets.try_acquire("u1:ping", policy).is_ok());
        assert!(buckets.try_acquire("u1:ping", policy).is_ok());
        let retry = buckets.try_acquire("u1:ping", policy).unwrap_err();
        assert_eq!(retry, Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(buckets.try_acquire("u1:ping", policy).is_ok());
        assert!(buckets.try_acquire("u1:ping", policy).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_refill_saturates_retry_delay() {
        let buckets = CooldownBuckets::new();
        let policy = CooldownPolicy::new(1, 1e-20);
        assert!(buckets.try_acquire("slow", policy).is_ok());
        assert_eq!(buckets.try_acquire("slow", policy).unwrap_err(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let buckets = CooldownBuckets::new();
        let policy = CooldownPolicy::new(1, 1.0);
        assert!(buckets.try_acquire("a", policy).is_ok());
        assert!(buckets.try_acquire("b", policy).is_ok());
        assert!(buckets.try_acquire("a", policy).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_and_prunable() {
        let buckets = CooldownBuckets::new();
        let policy = CooldownPolicy::new(2, 1.0);
        buckets.try_acquire("a", policy).unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(buckets.prune(1.0), 1);

        buckets.try_acquire("a", policy).unwrap();
        buckets.try_acquire("a", policy).unwrap();
        assert!(buckets.try_acquire("a", policy).is_err());
    }
}
