//! # Cached Fetch
//!
//! Puts a [`TtlCache`] in front of a [`Scheduler`]: the read-through path
//! every platform client uses.
//!
//! ```text
//!     get_or_fetch(request, op)
//!          │
//!          ▼
//!     cache.get(key) ──hit──► value (no tokens spent)
//!          │ miss
//!          ▼
//!     scheduler.schedule(resource, priority, op)
//!          │
//!          ├─ Err(e) ──► Err(e)          (nothing cached)
//!          └─ Ok(v)  ──► cache.set(key, v, ttl policy) ──► v
//! ```
//!
//! Two concurrent misses on the same key both fetch; the later result
//! overwrites the earlier one.

use crate::cache::TtlCache;
use crate::error::ScheduleError;
use crate::scheduler::{Scheduler, DEFAULT_COST, DEFAULT_PRIORITY};
use crate::utils::fingerprint;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type TtlFn<V> = Box<dyn Fn(&V) -> Duration + Send + Sync>;

enum TtlPolicy<V> {
    CacheDefault,
    Fixed(Duration),
    Computed(TtlFn<V>),
}

/// What to fetch, where to charge it and how long to keep the answer.
///
/// # Example
///
/// ```rust
/// use ratecache::FetchRequest;
/// use std::time::Duration;
///
/// let request = FetchRequest::<Vec<String>>::for_subject("twitter", "Alice")
///     .priority(5)
///     .ttl_with(|posts| {
///         // Popular accounts change slowly enough to keep longer.
///         if posts.len() > 100 {
///             Duration::from_secs(3600)
///         } else {
///             Duration::from_secs(300)
///         }
///     });
///
/// assert_eq!(request.key(), "twitter:alice");
/// assert_eq!(request.resource(), "twitter");
/// ```
pub struct FetchRequest<V> {
    key: String,
    resource: String,
    priority: i32,
    cost: f64,
    ttl: TtlPolicy<V>,
}

impl<V> FetchRequest<V> {
    /// Request for an explicit cache key, charged to `resource`.
    pub fn new(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            resource: resource.into(),
            priority: DEFAULT_PRIORITY,
            cost: DEFAULT_COST,
            ttl: TtlPolicy::CacheDefault,
        }
    }

    /// Request keyed by [`fingerprint`]`(resource, subject)`.
    pub fn for_subject(resource: impl Into<String>, subject: &str) -> Self {
        let resource = resource.into();
        let key = fingerprint(&resource, subject);
        Self::new(resource, key)
    }

    /// Queue priority used on a miss (higher runs first).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Tokens charged on a miss.
    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Keeps the fetched value for a fixed duration.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = TtlPolicy::Fixed(ttl);
        self
    }

    /// Chooses the TTL from the fetched value.
    pub fn ttl_with<P>(mut self, policy: P) -> Self
    where
        P: Fn(&V) -> Duration + Send + Sync + 'static,
    {
        self.ttl = TtlPolicy::Computed(Box::new(policy));
        self
    }

    /// Cache key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resource charged on a miss.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn ttl_for(&self, value: &V, default: Duration) -> Duration {
        match &self.ttl {
            TtlPolicy::CacheDefault => default,
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::Computed(policy) => policy(value),
        }
    }
}

impl<V> fmt::Debug for FetchRequest<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ttl = match &self.ttl {
            TtlPolicy::CacheDefault => "cache default".to_string(),
            TtlPolicy::Fixed(ttl) => format!("{:?}", ttl),
            TtlPolicy::Computed(_) => "computed".to_string(),
        };
        f.debug_struct("FetchRequest")
            .field("key", &self.key)
            .field("resource", &self.resource)
            .field("priority", &self.priority)
            .field("cost", &self.cost)
            .field("ttl", &ttl)
            .finish()
    }
}

/// Read-through cache over a rate-limited scheduler.
///
/// # Example
///
/// ```rust
/// use ratecache::{
///     BucketConfig, CacheConfig, CachedFetcher, FetchRequest, Scheduler, SchedulerConfig,
///     TtlCache,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = Scheduler::new(
///     SchedulerConfig::default().with_resource("github", BucketConfig::per_hour(5000)),
/// );
/// let cache = Arc::new(TtlCache::new(CacheConfig::default()));
/// let fetcher = CachedFetcher::new(cache, scheduler);
///
/// let first = fetcher
///     .get_or_fetch(FetchRequest::for_subject("github", "octocat"), || async {
///         Ok::<_, std::io::Error>(String::from("profile"))
///     })
///     .await
///     .unwrap();
///
/// // Same fingerprint, so this is served from the cache.
/// let second = fetcher
///     .get_or_fetch(FetchRequest::for_subject("github", "OctoCat"), || async {
///         Ok::<_, std::io::Error>(String::from("fresh profile"))
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(second, "profile");
/// assert_eq!(first, second);
/// # }
/// ```
pub struct CachedFetcher<V> {
    cache: Arc<TtlCache<V>>,
    scheduler: Scheduler,
}

impl<V> Clone for CachedFetcher<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> CachedFetcher<V> {
    /// Combines a cache and a scheduler. Both may be shared with other
    /// fetchers.
    pub fn new(cache: Arc<TtlCache<V>>, scheduler: Scheduler) -> Self {
        Self { cache, scheduler }
    }

    /// Returns the cached value for `request`, or runs `operation` through
    /// the scheduler and caches what it returns.
    ///
    /// # Errors
    ///
    /// Whatever [`Scheduler::schedule_with_cost`] returns on a miss. Failed
    /// fetches are never cached.
    pub async fn get_or_fetch<E, F, Fut>(
        &self,
        request: FetchRequest<V>,
        operation: F,
    ) -> Result<V, ScheduleError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Send + 'static,
    {
        if let Some(value) = self.cache.get(&request.key) {
            debug!("Cache hit for '{}'", request.key);
            return Ok(value);
        }

        debug!(
            "Cache miss for '{}', scheduling on '{}'",
            request.key, request.resource
        );
        let value = self
            .scheduler
            .schedule_with_cost(&request.resource, request.priority, request.cost, operation)
            .await?;

        let ttl = request.ttl_for(&value, self.cache.config().default_ttl());
        self.cache.set_with_ttl(request.key, value.clone(), ttl);
        Ok(value)
    }

    /// Drops the cached value for `key`. Returns `true` if one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.delete(key)
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<TtlCache<V>> {
        &self.cache
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<V> fmt::Debug for CachedFetcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFetcher")
            .field("cache", &self.cache)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
