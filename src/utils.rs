//! # Utility Functions (utils.rs)
//!
//! Small helpers shared by the scheduler and the cache: the monotonic clock
//! both of them read, resource fingerprints, and poison-tolerant locking.
//!
//! ## Clock
//!
//! ```text
//!     tokio::time::Instant
//!          │
//!          ├─ real runtime:   follows the OS monotonic clock
//!          └─ paused runtime: only moves on tokio::time::advance()
//! ```
//!
//! Every timestamp in this crate goes through [`now`], so tests that pause
//! the tokio clock see bucket refills and cache expiry move in lock-step
//! with simulated time.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Separator between the resource and the subject of a fingerprint.
pub const FINGERPRINT_SEPARATOR: char = ':';

/// Returns the current monotonic instant.
///
/// Backed by `tokio::time::Instant`, so it honours a paused test clock.
///
/// # Example
///
/// ```rust
/// use ratecache::now;
///
/// let start = now();
/// assert!(now() >= start);
/// ```
#[inline(always)]
pub fn now() -> Instant {
    Instant::now()
}

/// Converts a millisecond count from configuration into a `Duration`.
#[inline(always)]
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Builds a cache fingerprint from a resource name and a subject.
///
/// The subject is trimmed and lower-cased so that `"Alice "` and `"alice"`
/// share one cache entry. The resource name is kept as-is.
///
/// # Example
///
/// ```rust
/// use ratecache::fingerprint;
///
/// assert_eq!(fingerprint("github", "  Octocat "), "github:octocat");
/// ```
pub fn fingerprint(resource: &str, subject: &str) -> String {
    let subject = subject.trim().to_lowercase();
    let mut key = String::with_capacity(resource.len() + 1 + subject.len());
    key.push_str(resource);
    key.push(FINGERPRINT_SEPARATOR);
    key.push_str(&subject);
    key
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// None of the state guarded in this crate can be left half-updated by a
/// panic (every critical section is a handful of field writes), so the
/// poisoned value is still consistent.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_normalizes_subject() {
        assert_eq!(fingerprint("twitter", "Alice"), "twitter:alice");
        assert_eq!(fingerprint("twitter", " alice\t"), "twitter:alice");
        assert_eq!(fingerprint("Reddit", "bob"), "Reddit:bob");
    }

    #[test]
    fn test_fingerprint_empty_subject() {
        assert_eq!(fingerprint("github", ""), "github:");
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(1500), Duration::from_millis(1500));
        assert_eq!(millis(0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_paused_clock() {
        let start = now();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(now() - start, Duration::from_millis(250));
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(5));
        let clone = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock(&mutex), 5);
    }
}
