//! Response cache: fingerprint → bytes with LRU eviction and per-entry TTL.
//!
//! Entries are immutable; expiry is absolute from insertion, not from last
//! access. The cache is double-bounded by total bytes and entry count, and
//! eviction is strictly least-recently-used so behavior under pressure is
//! deterministic. Expired entries are deleted lazily on access.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

/// Sizing and TTL knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_items: usize,
    pub max_bytes: usize,
    /// Default time-to-live applied by [`ResponseCache::set`].
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: 10_000,
            max_bytes: 256 * 1024 * 1024,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Monotone counters plus current occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub items: usize,
    pub bytes: usize,
}

#[derive(Debug)]
struct Slot {
    value: Bytes,
    expires_at: Instant,
    recency: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, Slot>,
    /// recency tick → key; the smallest tick is the LRU entry.
    order: BTreeMap<u64, String>,
    tick: u64,
    bytes: usize,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.recency);
        self.bytes -= slot.value.len();
        Some(slot)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((&tick, _)) = self.order.iter().next() else {
            return false;
        };
        if let Some(key) = self.order.remove(&tick) {
            if let Some(slot) = self.map.remove(&key) {
                self.bytes -= slot.value.len();
            }
        }
        true
    }
}

/// Thread-safe LRU+TTL byte cache.
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Creates a cache with the given bounds.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether lookups and inserts are live.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the cached bytes for `key` if present and unexpired, moving
    /// the entry to most-recently-used. Expired entries are deleted here.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if !self.config.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired = match inner.map.get(key) {
            Some(slot) => slot.expires_at <= now,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let tick = inner.next_tick();
        let (old, value) = {
            let slot = inner.map.get_mut(key).expect("presence checked above");
            (std::mem::replace(&mut slot.recency, tick), slot.value.clone())
        };
        inner.order.remove(&old);
        inner.order.insert(tick, key.to_string());

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Inserts with the configured default TTL.
    pub fn set(&self, key: &str, value: Bytes) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Inserts with an explicit TTL, evicting from the LRU tail until both
    /// bounds hold. Values larger than `max_bytes` are not admitted.
    pub fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) {
        if !self.config.enabled || value.len() > self.config.max_bytes {
            return;
        }
        let mut inner = self.inner.lock();

        inner.remove(key);
        while inner.map.len() + 1 > self.config.max_items
            || inner.bytes + value.len() > self.config.max_bytes
        {
            if !inner.evict_lru() {
                break;
            }
        }

        let tick = inner.next_tick();
        inner.bytes += value.len();
        inner.order.insert(tick, key.to_string());
        inner.map.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Instant::now() + ttl,
                recency: tick,
            },
        );
    }

    /// Current counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            items: inner.map.len(),
            bytes: inner.bytes,
        }
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
        inner.bytes = 0;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
