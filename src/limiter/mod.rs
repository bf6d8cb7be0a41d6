//! Per-key token-bucket rate limiter with lazy refill.
//!
//! Each key owns a bucket that starts full at `burst` tokens and refills at
//! `rps` tokens per second, computed lazily on access. Buckets idle for ten
//! minutes are dropped by a periodic compaction task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buckets idle longer than this are deleted by compaction.
pub const IDLE_BUCKET_TIMEOUT: Duration = Duration::from_secs(600);

/// How often the compaction task scans for idle buckets.
pub const COMPACTION_INTERVAL: Duration = Duration::from_secs(60);

/// Refill rate and burst capacity.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Sustained tokens per second granted to each key.
    pub rps: f64,
    /// Bucket capacity; also the initial balance of a fresh bucket.
    pub burst: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 10.0,
            burst: 20.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Thread-safe per-key token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Creates a limiter; call [`RateLimiter::start_compaction`] to reclaim
    /// idle buckets in long-lived processes.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(LimiterConfig {
            enabled: false,
            ..LimiterConfig::default()
        })
    }

    /// Takes one token for `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_n(key, 1.0)
    }

    /// Takes `n` tokens for `key`; returns `false` without side effects on
    /// the balance when the bucket cannot cover the request.
    pub fn allow_n(&self, key: &str, n: f64) -> bool {
        if !self.config.enabled {
            return true;
        }
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.config.burst,
            refilled_at: now,
        });

        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rps).min(self.config.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= n {
            bucket.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Removes buckets that have not been touched for
    /// [`IDLE_BUCKET_TIMEOUT`]. Returns how many were dropped.
    pub fn compact(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.duration_since(bucket.refilled_at) < IDLE_BUCKET_TIMEOUT);
        before - buckets.len()
    }

    /// Spawns the periodic compaction task. Stopped by [`RateLimiter::close`].
    pub fn start_compaction(self: Arc<Self>) {
        if !self.config.enabled {
            return;
        }
        let shutdown = self.shutdown.clone();
        let limiter = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(COMPACTION_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let dropped = limiter.compact();
                        if dropped > 0 {
                            debug!(dropped, "compacted idle rate-limit buckets");
                        }
                    }
                }
            }
        });
    }

    /// Stops the compaction task. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: f64) -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            enabled: true,
            rps,
            burst,
        })
    }

    #[test]
    fn fresh_bucket_grants_burst() {
        let limiter = limiter(1.0, 3.0);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn refill_is_lazy_and_clamped_at_burst() {
        let limiter = limiter(1000.0, 5.0);
        for _ in 0..5 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));

        std::thread::sleep(Duration::from_millis(10));
        // ~10 tokens accrued but the bucket clamps at burst = 5.
        for _ in 0..5 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(0.001, 1.0);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn allow_n_is_all_or_nothing() {
        let limiter = limiter(0.001, 10.0);
        assert!(!limiter.allow_n("k", 11.0));
        // The failed request must not have drained the bucket.
        assert!(limiter.allow_n("k", 10.0));
    }

    #[test]
    fn window_admissions_bounded_by_rate_plus_burst() {
        let limiter = limiter(100.0, 10.0);
        let start = Instant::now();
        let mut admitted = 0u32;
        while start.elapsed() < Duration::from_millis(100) {
            if limiter.allow("k") {
                admitted += 1;
            }
        }
        let elapsed = start.elapsed().as_secs_f64();
        let bound = (100.0 * elapsed + 10.0).ceil() as u32;
        assert!(admitted <= bound, "admitted {admitted} > bound {bound}");
    }

    #[test]
    fn disabled_mode_always_admits() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1_000 {
            assert!(limiter.allow("k"));
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn compaction_drops_only_idle_buckets() {
        let limiter = limiter(1.0, 1.0);
        limiter.allow("fresh");
        {
            let mut buckets = limiter.buckets.lock();
            let bucket = buckets.get_mut("fresh").unwrap();
            bucket.refilled_at = Instant::now() - IDLE_BUCKET_TIMEOUT - Duration::from_secs(1);
            buckets.insert(
                "active".to_string(),
                Bucket {
                    tokens: 1.0,
                    refilled_at: Instant::now(),
                },
            );
        }
        assert_eq!(limiter.compact(), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }
}
