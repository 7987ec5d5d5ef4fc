//! # Token Bucket
//!
//! The admission budget for one resource. Tokens refill continuously in
//! proportion to elapsed time and each admitted operation spends `cost`
//! of them.
//!
//! ```text
//!     How the bucket moves (max 10, refill 1/s):
//!
//!     t=0s   [🪙🪙🪙🪙🪙🪙🪙🪙🪙🪙] 10.0   full
//!     t=0s   [🪙🪙🪙🪙🪙         ]  5.0   try_consume(5)  ✅
//!     t=0s   [🪙🪙🪙🪙🪙         ]  5.0   try_consume(6)  ❌ unchanged
//!     t=2.5s [🪙🪙🪙🪙🪙🪙🪙▌     ]  7.5   refill (+2.5)
//!     t=60s  [🪙🪙🪙🪙🪙🪙🪙🪙🪙🪙] 10.0   clamped at max
//! ```
//!
//! The bucket itself is plain data. The scheduler keeps it behind its
//! lane's mutex, so there is no atomic trickery here: `0 <= tokens <=
//! max_tokens` holds after every method returns.

use super::config::BucketConfig;
use crate::utils::now;
use std::time::Duration;
use tokio::time::Instant;

/// Continuous-refill token bucket.
///
/// Every operation has an `*_at(now)` twin taking an explicit instant, so
/// the arithmetic can be exercised without a clock.
///
/// # Example
///
/// ```rust
/// use ratecache::{now, BucketConfig, TokenBucket};
///
/// let start = now();
/// let mut bucket = TokenBucket::with_tokens_at(BucketConfig::new(10.0, 1.0), 10.0, start);
/// assert!(bucket.try_consume_at(4.0, start));
/// assert_eq!(bucket.tokens(), 6.0);
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Current budget, always within `0..=max_tokens`.
    tokens: f64,

    max_tokens: f64,

    refill_per_second: f64,

    last_refill_at: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(config: BucketConfig) -> Self {
        Self::with_tokens_at(config, config.max_tokens, now())
    }

    /// Creates a bucket holding `tokens` (clamped to `0..=max_tokens`) whose
    /// refill clock starts at `at`.
    pub fn with_tokens_at(config: BucketConfig, tokens: f64, at: Instant) -> Self {
        Self {
            tokens: tokens.clamp(0.0, config.max_tokens),
            max_tokens: config.max_tokens,
            refill_per_second: config.refill_per_second,
            last_refill_at: at,
        }
    }

    /// Adds the tokens accrued since the last refill.
    #[inline]
    pub fn refill(&mut self) {
        self.refill_at(now());
    }

    /// Adds `elapsed * refill_per_second` tokens, clamped to `max_tokens`,
    /// and moves the refill clock to `at`.
    ///
    /// An `at` earlier than the last refill adds nothing and leaves the
    /// clock where it is.
    pub fn refill_at(&mut self, at: Instant) {
        let elapsed = at.saturating_duration_since(self.last_refill_at);
        if elapsed.is_zero() {
            return;
        }

        let accrued = elapsed.as_secs_f64() * self.refill_per_second;
        self.tokens = (self.tokens + accrued).min(self.max_tokens);
        self.last_refill_at = at;
    }

    /// Refills, then spends `cost` tokens if at least that many are
    /// available.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    #[inline]
    pub fn try_consume(&mut self, cost: f64) -> bool {
        self.try_consume_at(cost, now())
    }

    /// [`try_consume`](Self::try_consume) against an explicit instant.
    pub fn try_consume_at(&mut self, cost: f64, at: Instant) -> bool {
        self.refill_at(at);
        if self.tokens >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available, assuming nothing else
    /// spends them. Zero if they already are.
    pub fn time_until(&mut self, cost: f64) -> Duration {
        self.time_until_at(cost, now())
    }

    /// [`time_until`](Self::time_until) against an explicit instant.
    pub fn time_until_at(&mut self, cost: f64, at: Instant) -> Duration {
        self.refill_at(at);
        let deficit = cost - self.tokens;
        if deficit <= 0.0 {
            return Duration::ZERO;
        }
        let secs = deficit / self.refill_per_second;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Credits `n` tokens, clamped to `max_tokens`.
    pub fn add_tokens(&mut self, n: f64) {
        if n.is_finite() && n > 0.0 {
            self.tokens = (self.tokens + n).min(self.max_tokens);
        }
    }

    /// Refills and returns the current balance.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Balance as of the last refill, without touching the clock.
    #[inline]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Bucket capacity.
    #[inline]
    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Refill rate in tokens per second.
    #[inline]
    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Instant of the last refill.
    #[inline]
    pub fn last_refill_at(&self) -> Instant {
        self.last_refill_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_bucket(max: f64, rate: f64) -> (TokenBucket, Instant) {
        let start = Instant::now();
        (
            TokenBucket::with_tokens_at(BucketConfig::new(max, rate), 0.0, start),
            start,
        )
    }

    #[test]
    fn test_starts_full() {
        let bucket = TokenBucket::new(BucketConfig::new(10.0, 1.0));
        assert_eq!(bucket.tokens(), 10.0);
        assert_eq!(bucket.max_tokens(), 10.0);
    }

    #[test]
    fn test_refill_correctness() {
        let (mut bucket, start) = empty_bucket(10.0, 1.0);
        let later = start + Duration::from_secs(5);

        assert!(bucket.try_consume_at(5.0, later));
        assert!(bucket.tokens().abs() < 1e-9);

        let (mut bucket, start) = empty_bucket(10.0, 1.0);
        let later = start + Duration::from_secs(5);

        assert!(!bucket.try_consume_at(6.0, later));
        assert!((bucket.tokens() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_refill_clamps_at_max() {
        let (mut bucket, start) = empty_bucket(10.0, 1.0);
        bucket.refill_at(start + Duration::from_secs(3600));
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[test]
    fn test_refill_is_proportional() {
        let (mut bucket, start) = empty_bucket(10.0, 2.0);
        bucket.refill_at(start + Duration::from_millis(1250));
        assert!((bucket.tokens() - 2.5).abs() < 1e-9);
        assert_eq!(bucket.last_refill_at(), start + Duration::from_millis(1250));
    }

    #[test]
    fn test_refill_ignores_earlier_instant() {
        let (mut bucket, start) = empty_bucket(10.0, 1.0);
        let later = start + Duration::from_secs(2);
        bucket.refill_at(later);
        bucket.refill_at(start);
        assert!((bucket.tokens() - 2.0).abs() < 1e-9);
        assert_eq!(bucket.last_refill_at(), later);
    }

    #[test]
    fn test_repeated_refill_is_idempotent() {
        let (mut bucket, start) = empty_bucket(10.0, 1.0);
        let at = start + Duration::from_secs(3);
        bucket.refill_at(at);
        bucket.refill_at(at);
        bucket.refill_at(at);
        assert!((bucket.tokens() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_consume_leaves_balance() {
        let (mut bucket, start) = empty_bucket(3.0, 1.0);
        let at = start + Duration::from_secs(1);
        assert!(!bucket.try_consume_at(2.0, at));
        assert!((bucket.tokens() - 1.0).abs() < 1e-9);
        assert!(bucket.try_consume_at(1.0, at));
        assert!(!bucket.try_consume_at(1.0, at));
    }

    #[test]
    fn test_bounds_hold_for_any_sequence() {
        let (mut bucket, start) = empty_bucket(4.0, 1.5);
        let costs = [1.0, 0.5, 3.0, 4.0, 0.0, 2.5, 1.0, 5.0];
        let mut at = start;

        for step in 0..200u64 {
            at += Duration::from_millis((step * 37) % 900);
            let cost = costs[(step as usize) % costs.len()];
            bucket.try_consume_at(cost, at);
            assert!(bucket.tokens() >= 0.0);
            assert!(bucket.tokens() <= bucket.max_tokens());
        }
    }

    #[test]
    fn test_time_until() {
        let (mut bucket, start) = empty_bucket(10.0, 2.0);
        assert_eq!(bucket.time_until_at(4.0, start), Duration::from_secs(2));

        let at = start + Duration::from_secs(2);
        assert_eq!(bucket.time_until_at(4.0, at), Duration::ZERO);
    }

    #[test]
    fn test_add_tokens_clamps() {
        let (mut bucket, _) = empty_bucket(5.0, 1.0);
        bucket.add_tokens(3.0);
        assert_eq!(bucket.tokens(), 3.0);
        bucket.add_tokens(30.0);
        assert_eq!(bucket.tokens(), 5.0);
        bucket.add_tokens(f64::NAN);
        bucket.add_tokens(-2.0);
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_with_tokens_clamps() {
        let bucket =
            TokenBucket::with_tokens_at(BucketConfig::new(5.0, 1.0), 50.0, Instant::now());
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_follows_paused_clock() {
        let mut bucket = TokenBucket::new(BucketConfig::new(2.0, 1.0));
        assert!(bucket.try_consume(2.0));
        assert!(!bucket.try_consume(1.0));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_consume(1.0));
        assert!(bucket.available() < 1e-9);
    }
}
