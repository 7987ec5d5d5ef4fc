//! # Scheduler Module
//!
//! Per-resource rate limiting with a priority wait queue. Every resource
//! (one per upstream platform) gets its own token bucket, its own queue and
//! at most one drain loop; resources never share tokens.
//!
//! ## Module Structure
//!
//! ```text
//!     scheduler/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── bucket.rs       (Continuous-refill token bucket)
//!     ├── config.rs       (Per-resource limits and validation)
//!     ├── core.rs         (Scheduler, lanes and drain loops)
//!     ├── metrics.rs      (Per-resource snapshots)
//!     └── queue.rs        (Stable priority wait queue)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     schedule("twitter", priority, op)
//!          │
//!          ▼
//!     ┌───────────┐
//!     │ Scheduler │ ◄── Finds or creates the resource's lane
//!     └─────┬─────┘
//!           │
//!           ▼
//!     ┌───────────┐     tokens?  ──Yes──► run now
//!     │  Bucket   │
//!     └─────┬─────┘
//!           │ No
//!           ▼
//!     ┌───────────┐
//!     │   Queue   │ ◄── Drained by one loop per resource
//!     └───────────┘
//! ```

mod bucket;
mod config;
mod core;
mod metrics;
mod queue;

/// Token bucket used by every lane
pub use bucket::TokenBucket;

/// Limits and scheduler-wide settings
pub use config::{BucketConfig, SchedulerConfig, DEFAULT_MAX_WAIT_TICK_MS};

/// The scheduler itself and its defaults
pub use core::{Scheduler, DEFAULT_COST, DEFAULT_PRIORITY};

/// Per-resource observability
pub use metrics::ResourceStats;

/// Priority queue for requests waiting on tokens
pub use queue::PriorityWaitQueue;
