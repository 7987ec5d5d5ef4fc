//! # Cache Module
//!
//! In-memory response cache with per-entry TTL and LRU eviction. One cache
//! per logical data type (profiles, posts, search results...).
//!
//! ## Module Structure
//!
//! ```text
//!     cache/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Capacity, TTL and sweep settings)
//!     ├── core.rs         (TtlCache: get/set/delete/clear, LRU eviction)
//!     ├── metrics.rs      (Occupancy and hit/miss counters)
//!     └── sweeper.rs      (Background expiry sweep task)
//! ```
//!
//! ## Removal Paths
//!
//! ```text
//!     ┌───────────────┬────────────────────────────────┐
//!     │ lazy expiry   │ get() finds now > expires_at   │
//!     │ sweep         │ periodic, expires_at <= now    │
//!     │ LRU eviction  │ set() of a new key when full   │
//!     │ explicit      │ delete() / clear()             │
//!     └───────────────┴────────────────────────────────┘
//! ```

mod config;
mod core;
mod metrics;
mod sweeper;

/// Cache settings
pub use config::CacheConfig;

/// The cache itself
pub use core::TtlCache;

/// Occupancy and counters
pub use metrics::CacheStats;

/// Handle to the background sweep task
pub use sweeper::SweeperHandle;
