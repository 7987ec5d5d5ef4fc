//! # Ratecache - Rate-Limited Fetching with a TTL/LRU Cache
//!
//! Upstream platform APIs hand out small quotas (a couple of hundred
//! requests per hour is common) while an application may be serving many
//! searches at once. This crate keeps every call to a platform inside its
//! quota, serves the most urgent requests first, and avoids calling the
//! platform at all when a recent answer is already known.
//!
//! ## The Pieces
//!
//! ```text
//!     get_or_fetch("twitter:alice")
//!          │
//!          ▼
//!     ┌─────────────┐  hit
//!     │  TtlCache   │ ─────────────────────────► value
//!     └──────┬──────┘
//!            │ miss
//!            ▼
//!     ┌─────────────┐  tokens now     ┌───────────────┐
//!     │  Scheduler  │ ──────────────► │ run operation │ ──► cache.set ──► value
//!     └──────┬──────┘                 └───────────────┘
//!            │ no tokens                       ▲
//!            ▼                                 │
//!     ┌─────────────┐  drain loop waits        │
//!     │ Wait Queue  │ ─── for refill ──────────┘
//!     └─────────────┘
//! ```
//!
//! - **[`TokenBucket`]**: continuous refill at `refill_per_second`, capped
//!   at `max_tokens`
//! - **[`PriorityWaitQueue`]**: higher priority first, FIFO among equals
//! - **[`Scheduler`]**: one bucket, one queue and at most one drain loop per
//!   resource (platform)
//! - **[`TtlCache`]**: per-entry expiry, LRU eviction, periodic sweep
//! - **[`CachedFetcher`]**: the read-through composition of the two
//!
//! ## Quick Start
//!
//! ```rust
//! use ratecache::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // 200 requests per hour, as published by the platform.
//! let scheduler = SchedulerBuilder::new()
//!     .resource("twitter", BucketConfig::per_hour(200))
//!     .build();
//!
//! let profiles = Arc::new(TtlCache::new(CacheConfig::new(1_000, 300_000)));
//! let fetcher = CachedFetcher::new(profiles, scheduler);
//!
//! let profile = fetcher
//!     .get_or_fetch(
//!         FetchRequest::for_subject("twitter", "alice").ttl(Duration::from_secs(600)),
//!         || async { Ok::<_, std::io::Error>(String::from("{\"name\":\"alice\"}")) },
//!     )
//!     .await
//!     .unwrap();
//!
//! assert!(profile.contains("alice"));
//! # }
//! ```
//!
//! ## Scheduling Directly
//!
//! ```rust
//! use ratecache::{BucketConfig, ScheduleError, Scheduler, SchedulerConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::default()
//!         .with_resource("reddit", BucketConfig::per_minute(60))
//!         .with_resource("github", BucketConfig::per_hour(5000)),
//! );
//!
//! // Priority 10 jumps ahead of anything queued at a lower priority.
//! let result: Result<u32, ScheduleError<String>> = scheduler
//!     .schedule("reddit", 10, || async { Ok(42) })
//!     .await;
//!
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```
//!
//! ## Guarantees
//!
//! | Property | Holds |
//! |----------|-------|
//! | Tokens never exceed `max_tokens` | always |
//! | Drain loops per resource | at most 1 |
//! | Cache entries | never more than `max_size` |
//! | Expired values returned by `get` | never |
//! | Operation error handed back | verbatim, to its own caller |
//!
//! ## Time
//!
//! All timestamps come from `tokio::time::Instant`. Under a paused tokio
//! test clock, refills, queue waits and cache expiry all follow
//! `tokio::time::advance`.
//!
//! ## Logging
//!
//! The crate emits `tracing` events (admission, queueing, drain loop
//! lifecycle, evictions, sweeps) and never installs a subscriber.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

mod cache;
mod error;
mod fetch;
mod scheduler;
mod utils;

// Public re-exports
pub use cache::{CacheConfig, CacheStats, SweeperHandle, TtlCache};
pub use error::{AdmissionError, ConfigError, ScheduleError, ScheduleErrorKind};
pub use fetch::{CachedFetcher, FetchRequest};
pub use scheduler::{
    BucketConfig, PriorityWaitQueue, ResourceStats, Scheduler, SchedulerConfig, TokenBucket,
    DEFAULT_COST, DEFAULT_MAX_WAIT_TICK_MS, DEFAULT_PRIORITY,
};
pub use utils::{fingerprint, millis, now, FINGERPRINT_SEPARATOR};

/// A cache wrapped in `Arc` for sharing between fetchers and the sweeper.
pub type SharedCache<V> = std::sync::Arc<TtlCache<V>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.75.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use ratecache::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for building a fetch path.
    //!
    //! # Example
    //! ```rust
    //! use ratecache::prelude::*;
    //!
    //! let scheduler = SchedulerBuilder::new()
    //!     .resource("github", BucketConfig::per_hour(5000))
    //!     .build();
    //! let cache: SharedCache<String> = std::sync::Arc::new(TtlCache::new(CacheConfig::default()));
    //! let _fetcher = CachedFetcher::new(cache, scheduler);
    //! ```

    pub use crate::{
        BucketConfig, CacheConfig, CachedFetcher, FetchRequest, ScheduleError, Scheduler,
        SchedulerBuilder, SchedulerConfig, SharedCache, TtlCache,
    };
}

/// Fluent construction of a [`Scheduler`].
///
/// # Example
///
/// ```rust
/// use ratecache::{BucketConfig, SchedulerBuilder};
///
/// let scheduler = SchedulerBuilder::new()
///     .resource("twitter", BucketConfig::per_hour(200))
///     .resource("reddit", BucketConfig::per_minute(60))
///     .default_limits(BucketConfig::per_second(1))
///     .max_wait_tick_ms(500)
///     .build();
///
/// assert_eq!(scheduler.resources(), vec!["reddit", "twitter"]);
///
/// // Or use try_build() for error handling
/// let result = SchedulerBuilder::new()
///     .resource("broken", BucketConfig::new(0.0, 1.0))
///     .try_build();
///
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Creates a builder with no resources and the default wait tick.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a resource and its limits.
    pub fn resource(mut self, name: impl Into<String>, limits: BucketConfig) -> Self {
        self.config = self.config.with_resource(name, limits);
        self
    }

    /// Limits used for resources that were not configured explicitly.
    ///
    /// Without this, scheduling on an unknown resource is an error. Lanes
    /// created this way stay until [`Scheduler::prune_idle_lanes`] removes
    /// them.
    pub fn default_limits(mut self, limits: BucketConfig) -> Self {
        self.config = self.config.with_default_limits(limits);
        self
    }

    /// Longest a drain loop sleeps before re-checking its bucket.
    pub fn max_wait_tick_ms(mut self, ms: u64) -> Self {
        self.config = self.config.with_max_wait_tick_ms(ms);
        self
    }

    /// Builds the scheduler.
    ///
    /// # Panics
    ///
    /// Panics if any limit is invalid. Use [`try_build`](Self::try_build)
    /// to handle that as an error.
    pub fn build(self) -> Scheduler {
        Scheduler::new(self.config)
    }

    /// Builds the scheduler, returning an error if the configuration is
    /// invalid.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn try_build(self) -> Result<Scheduler, ConfigError> {
        Scheduler::try_new(self.config)
    }
}
