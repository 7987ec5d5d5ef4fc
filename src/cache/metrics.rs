//! # Cache Metrics
//!
//! Snapshot of a cache's occupancy and lifetime counters.

use std::fmt;

/// Utilization above which [`CacheStats::is_near_capacity`] reports `true`.
const NEAR_CAPACITY_RATIO: f64 = 0.8;

/// Occupancy and counters for one [`TtlCache`](crate::TtlCache).
///
/// ## Metrics Explained
///
/// - **size / max_size / utilization**: current occupancy (`size / max_size`)
/// - **hits / misses**: `get` outcomes; an expired entry counts as a miss
/// - **evictions**: entries removed to make room (LRU)
/// - **expirations**: entries removed because their TTL passed, whether
///   found lazily by `get` or by the sweep
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Entries currently stored.
    pub size: usize,

    /// Entry cap.
    pub max_size: usize,

    /// `size / max_size` (0.0 to 1.0).
    pub utilization: f64,

    /// `get` calls that returned a value.
    pub hits: u64,

    /// `get` calls that returned nothing.
    pub misses: u64,

    /// Entries evicted as least recently used.
    pub evictions: u64,

    /// Entries removed after expiring.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit (1.0 before any lookup).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total `get` calls counted.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// `true` once more than 80% of the slots are used.
    pub fn is_near_capacity(&self) -> bool {
        self.utilization > NEAR_CAPACITY_RATIO
    }

    /// Multi-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Cache Stats:\n\
             ├─ Capacity:\n\
             │  ├─ Entries: {}/{}\n\
             │  └─ Utilization: {:.2}%\n\
             ├─ Lookups:\n\
             │  ├─ Hits: {}\n\
             │  ├─ Misses: {}\n\
             │  └─ Hit Rate: {:.2}%\n\
             └─ Removals:\n\
                ├─ Evictions: {}\n\
                └─ Expirations: {}",
            self.size,
            self.max_size,
            self.utilization * 100.0,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.expirations,
        )
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
