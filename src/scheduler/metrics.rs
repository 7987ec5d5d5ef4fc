//! # Scheduler Metrics
//!
//! Point-in-time snapshot of one resource lane.
//!
//! ```text
//!     Resource "twitter":
//!     ┌─────────────────────────────────────┐
//!     │  Tokens: 12.4 / 200                 │
//!     │  ▓░░░░░░░░░░░░░░░░░░░  (6%)         │
//!     │                                     │
//!     │  Waiting: 37                        │
//!     │  Executed: 1 204                    │
//!     │  Drain loops: 1 active (peak 1)     │
//!     └─────────────────────────────────────┘
//! ```

use std::fmt;

/// Snapshot of a resource lane's bucket, queue and counters.
///
/// # Example
///
/// ```rust
/// use ratecache::{BucketConfig, Scheduler, SchedulerConfig};
///
/// let scheduler = Scheduler::new(
///     SchedulerConfig::default().with_resource("github", BucketConfig::per_hour(5000)),
/// );
/// let stats = scheduler.stats("github").unwrap();
/// assert_eq!(stats.queue_len, 0);
/// assert_eq!(stats.invocations, 0);
/// println!("{}", stats.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStats {
    /// Resource name.
    pub resource: String,

    /// Tokens available right now (after refill).
    pub available_tokens: f64,

    /// Bucket capacity.
    pub max_tokens: f64,

    /// Requests waiting in the priority queue.
    pub queue_len: usize,

    /// Operations actually executed (fast path and drain loop), since
    /// creation or the last counter reset.
    pub invocations: u64,

    /// Drain loops currently running. Never more than 1.
    pub active_drains: usize,

    /// Highest `active_drains` ever observed since the last counter reset.
    pub peak_active_drains: usize,
}

impl ResourceStats {
    /// Fraction of the bucket currently spent (0.0 = full, 1.0 = empty).
    pub fn utilization(&self) -> f64 {
        if self.max_tokens <= 0.0 {
            0.0
        } else {
            1.0 - (self.available_tokens / self.max_tokens)
        }
    }

    /// `true` if anything is waiting for tokens.
    pub fn is_backlogged(&self) -> bool {
        self.queue_len > 0
    }

    /// Multi-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Resource '{}':\n\
             ├─ Bucket:\n\
             │  ├─ Available Tokens: {:.2}/{:.2}\n\
             │  └─ Utilization: {:.2}%\n\
             ├─ Queue:\n\
             │  └─ Waiting: {}\n\
             └─ Execution:\n\
                ├─ Invocations: {}\n\
                ├─ Active Drain Loops: {}\n\
                └─ Peak Drain Loops: {}",
            self.resource,
            self.available_tokens,
            self.max_tokens,
            self.utilization() * 100.0,
            self.queue_len,
            self.invocations,
            self.active_drains,
            self.peak_active_drains,
        )
    }
}

impl fmt::Display for ResourceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
