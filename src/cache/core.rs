//! # TTL/LRU Cache
//!
//! Bounded key-value store for upstream responses, keyed by fingerprint
//! (`"platform:subject"`).
//!
//! ## Entry Lifecycle
//!
//! ```text
//!     set ──► [fresh] ──get──► [fresh, touched] ──get──► ...
//!                │                     │
//!                │ now > expires_at    │ least recently used
//!                ▼                     │ and cache full on set
//!           [expired] ──get──► removed, miss
//!                │                     ▼
//!                └─sweep──► removed   evicted
//! ```
//!
//! ## Capacity
//!
//! The size cap is enforced *before* insertion: a `set` of a new key on a
//! full cache evicts the least recently used entry first, so the map never
//! holds more than `max_size` entries. Recency is the `last_accessed_at`
//! timestamp, with a global access sequence number breaking ties between
//! entries touched at the same instant.
//!
//! ## Expiry
//!
//! `get` checks expiry itself and never returns a stale value, whether or
//! not the sweep has run. The sweep ([`TtlCache::purge_expired`], or the
//! background task from [`TtlCache::start_sweeper`]) only bounds memory
//! held by entries nobody reads again.

use super::{config::CacheConfig, metrics::CacheStats, sweeper::SweeperHandle};
use crate::error::ConfigError;
use crate::utils::{lock, now};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Expiry used when `now + ttl` would overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Upper bound on the initial allocation, whatever `max_size` says.
const MAX_INITIAL_CAPACITY: usize = 4096;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed_at: Instant,
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_expired_at(&self, at: Instant) -> bool {
        at > self.expires_at
    }
}

/// Concurrent TTL cache with LRU eviction.
///
/// Values are cloned out on every hit; wrap large payloads in an `Arc`.
/// To remember "not found" answers, store `Option<T>` and give those
/// entries a short TTL.
///
/// # Example
///
/// ```rust
/// use ratecache::{CacheConfig, TtlCache};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = TtlCache::new(CacheConfig::new(2, 60_000));
///
/// cache.set("twitter:alice", "profile a");
/// cache.set_with_ttl("twitter:bob", "profile b", Duration::from_secs(5));
///
/// assert_eq!(cache.get("twitter:alice"), Some("profile a"));
/// assert_eq!(cache.get("twitter:carol"), None);
///
/// let stats = cache.stats();
/// assert_eq!(stats.size, 2);
/// assert_eq!(stats.utilization, 1.0);
/// # }
/// ```
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>, ahash::RandomState>,
    config: CacheConfig,

    /// Serializes the evict-then-insert step of `set` so concurrent
    /// writers cannot overshoot `max_size`.
    write_lock: Mutex<()>,

    /// Source of `access_seq` values.
    access_clock: AtomicU64,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Use
    /// [`try_new`](Self::try_new) to handle that as an error.
    pub fn new(config: CacheConfig) -> Self {
        Self::try_new(config).expect("Invalid cache configuration")
    }

    /// Creates an empty cache, validating the configuration first.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn try_new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .next_power_of_two()
            .clamp(4, 64);
        let initial_capacity = config.max_size.min(MAX_INITIAL_CAPACITY);

        Ok(Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                initial_capacity,
                ahash::RandomState::new(),
                num_shards,
            ),
            config,
            write_lock: Mutex::new(()),
            access_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    /// Looks up `key`.
    ///
    /// A live entry is marked as most recently used and its value returned.
    /// An expired entry is removed and reported as a miss. A miss never
    /// creates an entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired_at(now) {
                entry.last_accessed_at = now;
                entry.access_seq = self.next_access_seq();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // Expired. Re-check under the removal so a concurrent fresh `set`
        // of the same key survives.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!("Expired cache entry '{}' on read", key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl());
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// The size limit counts distinct keys. Inserting a new key into a
    /// full cache first evicts exactly one entry, the least recently used.
    /// Overwriting a key that is already present replaces it in place and
    /// evicts nothing, even when the cache is full, since the entry count
    /// does not grow.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = now();
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now + FAR_FUTURE),
            last_accessed_at: now,
            access_seq: self.next_access_seq(),
        };

        let _writer = lock(&self.write_lock);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size {
            self.evict_lru();
        }
        self.entries.insert(key, entry);
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&self) {
        let _writer = lock(&self.write_lock);
        let removed = self.entries.len();
        self.entries.clear();
        info!("Cleared cache ({} entries)", removed);
    }

    /// `true` if `key` holds a live entry. Does not count as an access.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry whose expiry is at or before now.
    ///
    /// This is the body of the periodic sweep. Returns the number of
    /// entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            info!("Sweep removed {} expired cache entries", removed);
        }
        removed
    }

    /// Occupancy and counters.
    pub fn stats(&self) -> CacheStats {
        let size = self.entries.len();
        CacheStats {
            size,
            max_size: self.config.max_size,
            utilization: size as f64 / self.config.max_size as f64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the hit, miss, eviction and expiration counters.
    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Removes the entry with the oldest access. Caller holds `write_lock`.
    fn evict_lru(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| (entry.last_accessed_at, entry.access_seq))
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Evicted least recently used cache entry '{}'", key);
            }
        }
    }

    #[inline]
    fn next_access_seq(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Starts the periodic expiry sweep on the current tokio runtime.
    ///
    /// The task runs [`purge_expired`](Self::purge_expired) every
    /// `sweep_interval_ms` until the handle is stopped or dropped, or the
    /// cache itself is dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ratecache::{CacheConfig, TtlCache};
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let cache = Arc::new(TtlCache::<String>::new(CacheConfig::default()));
    /// let sweeper = cache.clone().start_sweeper();
    /// assert!(sweeper.is_running());
    /// sweeper.stop().await;
    /// # }
    /// ```
    pub fn start_sweeper(self: Arc<Self>) -> SweeperHandle {
        let period = self.config.sweep_interval();
        SweeperHandle::spawn(Arc::downgrade(&self), period)
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}
