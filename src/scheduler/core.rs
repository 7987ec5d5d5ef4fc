//! # Core Scheduler Implementation
//!
//! The public entry point for rate-limited work. Each resource (one per
//! upstream platform) owns a lane: a token bucket, a priority wait queue
//! and at most one drain loop.
//!
//! ## Request Flow
//!
//! ```text
//!     schedule(resource, priority, op)
//!          │
//!          ▼
//!     queue empty AND bucket.try_consume(cost)?
//!          │                         │
//!         Yes                        No
//!          │                         │
//!          ▼                         ▼
//!     run op now in the        enqueue (priority, FIFO)
//!     caller's task ──► result      │
//!                                    ▼
//!                           drain loop running? ──No──► spawn one
//!                                    │
//!                                    ▼
//!                           caller awaits its oneshot
//! ```
//!
//! ## Drain Loop
//!
//! ```text
//!     loop:
//!       head = queue.peek()            (none ──► release flag, exit)
//!       bucket.try_consume(head.cost)?
//!          No  ──► sleep(min(time_until(cost), tick)) or wake on notify
//!          Yes ──► dequeue, run, deliver result to that caller only
//! ```
//!
//! The `processing` flag is the only mutual exclusion between loops: it is
//! claimed with a compare-and-swap before a loop is spawned and released
//! when the queue is observed empty. A loop that releases the flag
//! re-checks the queue once, closing the window where an enqueue saw the
//! flag still set. A loop cancelled by runtime shutdown abandons whatever
//! is still queued.
//!
//! ## Lane Lifetime
//!
//! Lanes for configured resources live as long as the scheduler. Lanes
//! created on first use from the default limits stay too, until
//! [`Scheduler::prune_idle_lanes`] removes the idle ones.
//!
//! ## Failure Isolation
//!
//! An operation's error or panic is delivered to its own caller. The loop
//! keeps going, and spent tokens are not refunded.

use super::{
    bucket::TokenBucket,
    config::{BucketConfig, SchedulerConfig},
    metrics::ResourceStats,
    queue::PriorityWaitQueue,
};
use crate::error::{AdmissionError, ConfigError, ScheduleError};
use crate::utils::{lock, millis};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

/// Cost charged when the caller does not specify one.
pub const DEFAULT_COST: f64 = 1.0;

/// Priority used by callers without an opinion.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Shortest drain-loop sleep.
///
/// Keeps a rounding-to-zero wait from turning into a busy loop.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Type-erased unit of queued work. Runs the operation and delivers its
/// outcome to the waiting caller.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A request waiting for tokens.
struct QueuedRequest {
    cost: f64,
    job: Job,
}

/// Bucket and queue share one lock so that "queue is empty" and "tokens
/// were taken" are decided together.
struct LaneState {
    bucket: TokenBucket,
    queue: PriorityWaitQueue<QueuedRequest>,
}

/// Everything the scheduler keeps for one resource.
struct Lane {
    name: String,
    state: Mutex<LaneState>,

    /// Set while a drain loop owns this lane.
    processing: AtomicBool,

    /// Wakes a sleeping drain loop early (new request, manual credit).
    wake: Notify,

    invocations: AtomicU64,
    active_drains: AtomicUsize,
    peak_active_drains: AtomicUsize,
}

impl Lane {
    fn new(name: &str, limits: BucketConfig) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(LaneState {
                bucket: TokenBucket::new(limits),
                queue: PriorityWaitQueue::new(),
            }),
            processing: AtomicBool::new(false),
            wake: Notify::new(),
            invocations: AtomicU64::new(0),
            active_drains: AtomicUsize::new(0),
            peak_active_drains: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    fn max_tokens(&self) -> f64 {
        lock(&self.state).bucket.max_tokens()
    }

    fn stats(&self) -> ResourceStats {
        let (available_tokens, max_tokens, queue_len) = {
            let mut state = lock(&self.state);
            (
                state.bucket.available(),
                state.bucket.max_tokens(),
                state.queue.len(),
            )
        };

        ResourceStats {
            resource: self.name.clone(),
            available_tokens,
            max_tokens,
            queue_len,
            invocations: self.invocations.load(Ordering::Relaxed),
            active_drains: self.active_drains.load(Ordering::Acquire),
            peak_active_drains: self.peak_active_drains.load(Ordering::Acquire),
        }
    }
}

/// Proof that the current task owns a lane's drain loop.
///
/// Dropping it lowers the active-loop gauge and then clears the
/// `processing` flag, in that order. A permit dropped without
/// [`release`](Self::release) belongs to a loop that was cancelled (its
/// runtime shut down) and takes the lane's queue with it, so the waiting
/// callers see [`ScheduleError::Abandoned`] instead of hanging.
struct DrainPermit {
    lane: Arc<Lane>,
    released: bool,
}

impl DrainPermit {
    /// Claims the `processing` flag, or returns `None` if a loop owns it.
    fn try_claim(lane: &Arc<Lane>) -> Option<Self> {
        lane.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let active = lane.active_drains.fetch_add(1, Ordering::AcqRel) + 1;
        lane.peak_active_drains.fetch_max(active, Ordering::AcqRel);
        Some(Self {
            lane: lane.clone(),
            released: false,
        })
    }

    /// Gives up ownership after the queue was observed empty.
    fn release(mut self) {
        self.released = true;
    }
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        if !self.released {
            let stranded: Vec<QueuedRequest> = lock(&self.lane.state).queue.drain().collect();
            if !stranded.is_empty() {
                warn!(
                    "Drain loop for '{}' cancelled, abandoning {} queued request(s)",
                    self.lane.name,
                    stranded.len()
                );
            }
        }
        self.lane.active_drains.fetch_sub(1, Ordering::AcqRel);
        self.lane.processing.store(false, Ordering::Release);
    }
}

struct Inner {
    config: SchedulerConfig,
    lanes: DashMap<String, Arc<Lane>, ahash::RandomState>,
    max_wait_tick: Duration,
}

/// Rate-limited request scheduler.
///
/// Cheap to clone; clones share the same lanes.
///
/// ## Example
///
/// ```rust
/// use ratecache::{BucketConfig, Scheduler, SchedulerConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = Scheduler::new(
///     SchedulerConfig::default().with_resource("twitter", BucketConfig::per_hour(200)),
/// );
///
/// let profile = scheduler
///     .schedule("twitter", 0, || async { Ok::<_, std::io::Error>("profile json") })
///     .await
///     .unwrap();
///
/// assert_eq!(profile, "profile json");
/// assert_eq!(scheduler.stats("twitter").unwrap().invocations, 1);
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler with one lane per configured resource.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Use
    /// [`try_new`](Self::try_new) to handle that as an error.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::try_new(config).expect("Invalid scheduler configuration")
    }

    /// Creates a scheduler, validating the configuration first.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn try_new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let lanes = DashMap::with_hasher(ahash::RandomState::new());
        for (name, limits) in &config.resources {
            lanes.insert(name.clone(), Arc::new(Lane::new(name, *limits)));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                max_wait_tick: millis(config.max_wait_tick_ms),
                config,
                lanes,
            }),
        })
    }

    /// Runs `operation` under `resource`'s rate limit at unit cost.
    ///
    /// See [`schedule_with_cost`](Self::schedule_with_cost).
    pub async fn schedule<T, E, F, Fut>(
        &self,
        resource: &str,
        priority: i32,
        operation: F,
    ) -> Result<T, ScheduleError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.schedule_with_cost(resource, priority, DEFAULT_COST, operation)
            .await
    }

    /// Runs `operation` under `resource`'s rate limit, spending `cost`
    /// tokens.
    ///
    /// If nothing is waiting and the bucket can pay, the operation runs
    /// right away in the caller's task. Otherwise it is queued by
    /// `priority` (higher first, FIFO among equals) and this future
    /// resolves once the drain loop has run it. The operation is invoked
    /// at most once.
    ///
    /// There is no timeout and no cancellation: dropping the returned
    /// future only discards the result, the queued operation still runs.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::Admission`] if the resource is unknown or `cost`
    ///   is invalid or larger than the bucket capacity.
    /// - [`ScheduleError::Operation`] with the operation's own error.
    /// - [`ScheduleError::Panicked`] if the operation panicked.
    /// - [`ScheduleError::Abandoned`] if the runtime hosting the drain loop
    ///   shut down before the operation finished.
    pub async fn schedule_with_cost<T, E, F, Fut>(
        &self,
        resource: &str,
        priority: i32,
        cost: f64,
        operation: F,
    ) -> Result<T, ScheduleError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let lane = self.lane(resource)?;
        Self::check_cost(&lane, cost)?;

        let admitted = {
            let mut state = lock(&lane.state);
            state.queue.is_empty() && state.bucket.try_consume(cost)
        };

        if admitted {
            debug!("Admitted request on '{}' immediately (cost {})", lane.name, cost);
            lane.record_invocation();
            return run_guarded(&lane.name, operation).await;
        }

        let (tx, rx) = oneshot::channel();
        let name = lane.name.clone();
        let job: Job = Box::new(move || {
            async move {
                let outcome = run_guarded(&name, operation).await;
                // The caller may have stopped listening.
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        let waiting = {
            let mut state = lock(&lane.state);
            state.queue.enqueue(priority, QueuedRequest { cost, job });
            state.queue.len()
        };
        debug!(
            "Queued request on '{}' (priority {}, cost {}, waiting {})",
            lane.name, priority, cost, waiting
        );

        lane.wake.notify_one();
        self.ensure_draining(&lane);

        rx.await.unwrap_or(Err(ScheduleError::Abandoned))
    }

    /// Credits `n` tokens to a resource's bucket (clamped to capacity) and
    /// wakes its drain loop.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::UnknownResource`] if the resource has no
    /// lane and no default limits apply.
    pub fn add_tokens(&self, resource: &str, n: f64) -> Result<(), AdmissionError> {
        let lane = self.lane(resource)?;
        lock(&lane.state).bucket.add_tokens(n);
        lane.wake.notify_one();
        Ok(())
    }

    /// Snapshot of one resource, if it has a lane.
    pub fn stats(&self, resource: &str) -> Option<ResourceStats> {
        self.inner.lanes.get(resource).map(|lane| lane.stats())
    }

    /// Snapshots of every lane, sorted by resource name.
    pub fn all_stats(&self) -> Vec<ResourceStats> {
        let mut stats: Vec<_> = self
            .inner
            .lanes
            .iter()
            .map(|entry| entry.value().stats())
            .collect();
        stats.sort_by(|a, b| a.resource.cmp(&b.resource));
        stats
    }

    /// Resets invocation counters and peak drain-loop gauges.
    pub fn reset_counters(&self) {
        for entry in self.inner.lanes.iter() {
            let lane = entry.value();
            lane.invocations.store(0, Ordering::Relaxed);
            lane.peak_active_drains
                .store(lane.active_drains.load(Ordering::Acquire), Ordering::Release);
        }
    }

    /// Names of every lane, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .lanes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of requests waiting on a resource.
    pub fn queue_len(&self, resource: &str) -> usize {
        self.inner
            .lanes
            .get(resource)
            .map(|lane| lock(&lane.state).queue.len())
            .unwrap_or(0)
    }

    /// Removes idle lanes that were created from the default limits.
    ///
    /// A lane is idle when no request, caller or drain loop holds it and its
    /// bucket is full, so a pruned resource comes back on its next request
    /// with exactly the budget it had. Configured resources are never
    /// removed. Returns the number of lanes removed.
    pub fn prune_idle_lanes(&self) -> usize {
        let configured = &self.inner.config.resources;
        let mut removed = 0;

        self.inner.lanes.retain(|name, lane| {
            // The shard is write-locked here, so no new reference can appear.
            if configured.contains_key(name) || Arc::strong_count(lane) > 1 {
                return true;
            }
            let mut state = lock(&lane.state);
            if state.queue.is_empty() && state.bucket.available() >= state.bucket.max_tokens() {
                debug!("Removing idle lane for '{}'", name);
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            debug!("Pruned {} idle lanes", removed);
        }
        removed
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Finds the lane for `resource`, creating it from the default limits
    /// if needed. Created lanes persist until pruned.
    fn lane(&self, resource: &str) -> Result<Arc<Lane>, AdmissionError> {
        if let Some(lane) = self.inner.lanes.get(resource) {
            return Ok(lane.clone());
        }

        let limits = self
            .inner
            .config
            .limits_for(resource)
            .ok_or_else(|| AdmissionError::UnknownResource(resource.to_string()))?;

        let lane = self
            .inner
            .lanes
            .entry(resource.to_string())
            .or_insert_with(|| {
                debug!("Created lane for '{}' from default limits", resource);
                Arc::new(Lane::new(resource, limits))
            })
            .clone();
        Ok(lane)
    }

    /// Rejects costs the bucket can never pay.
    fn check_cost(lane: &Lane, cost: f64) -> Result<(), AdmissionError> {
        if !cost.is_finite() || cost < 0.0 {
            warn!("Rejected request on '{}': invalid cost {}", lane.name, cost);
            return Err(AdmissionError::InvalidCost(cost));
        }

        let max_tokens = lane.max_tokens();
        if cost > max_tokens {
            warn!(
                "Rejected request on '{}': cost {} exceeds capacity {}",
                lane.name, cost, max_tokens
            );
            return Err(AdmissionError::CostExceedsCapacity { cost, max_tokens });
        }
        Ok(())
    }

    /// Spawns a drain loop unless one already owns the lane.
    fn ensure_draining(&self, lane: &Arc<Lane>) {
        if let Some(permit) = DrainPermit::try_claim(lane) {
            tokio::spawn(drain(permit, self.inner.max_wait_tick));
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("resources", &self.resources())
            .field("max_wait_tick", &self.inner.max_wait_tick)
            .finish()
    }
}

/// Runs an operation, turning a panic into [`ScheduleError::Panicked`].
async fn run_guarded<T, E, F, Fut>(resource: &str, operation: F) -> Result<T, ScheduleError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match AssertUnwindSafe(async move { operation().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ScheduleError::Operation(err)),
        Err(_) => {
            warn!("Operation on '{}' panicked", resource);
            Err(ScheduleError::Panicked)
        }
    }
}

/// Drain loop for one lane, owning it through `permit`.
async fn drain(mut permit: DrainPermit, max_tick: Duration) {
    let lane = permit.lane.clone();
    debug!("Drain loop started for '{}'", lane.name);

    loop {
        if let Some(job) = next_admitted(&lane, max_tick).await {
            lane.record_invocation();
            job().await;
            continue;
        }

        // Queue observed empty: give up ownership, then look once more in
        // case an enqueue raced with the release.
        permit.release();

        let pending = !lock(&lane.state).queue.is_empty();
        if pending {
            if let Some(reclaimed) = DrainPermit::try_claim(&lane) {
                permit = reclaimed;
                continue;
            }
        }
        break;
    }

    debug!("Drain loop stopped for '{}'", lane.name);
}

/// Waits until the head request can be paid for, then dequeues it.
///
/// Returns `None` once the queue is empty.
async fn next_admitted(lane: &Lane, max_tick: Duration) -> Option<Job> {
    loop {
        let wait = {
            let mut state = lock(&lane.state);
            let cost = state.queue.peek()?.cost;
            if state.bucket.try_consume(cost) {
                return state.queue.dequeue().map(|request| request.job);
            }
            state.bucket.time_until(cost).min(max_tick).max(MIN_WAIT)
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = lane.wake.notified() => {}
        }
    }
}
