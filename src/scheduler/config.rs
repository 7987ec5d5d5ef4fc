//! # Scheduler Configuration
//!
//! Per-resource token bucket limits and scheduler-wide settings. Think of
//! this as the table of upstream quotas the scheduler has to respect.
//!
//! ## Token Bucket Parameters
//!
//! ```text
//!     Bucket for "twitter" (200 requests / hour):
//!
//!     ┌──────────────────────────────┐
//!     │   max_tokens: 200            │ ← Burst limit
//!     │   ┌─────────────────────┐    │
//!     │   │ 🪙 🪙 🪙 🪙 🪙     │    │ ← Current tokens (fractional)
//!     │   └─────────────────────┘    │
//!     │                              │
//!     │   refill_per_second: 0.0555  │ ← Continuous refill
//!     └──────────────────────────────┘
//! ```
//!
//! Configuration is fixed once a [`Scheduler`](crate::Scheduler) is built.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default upper bound on a single drain-loop sleep (milliseconds).
///
/// The drain loop sleeps for the shorter of "time until the head request
/// can be admitted" and this tick, so a refill that arrives by other means
/// (e.g. [`Scheduler::add_tokens`](crate::Scheduler::add_tokens)) is noticed
/// within one tick even if its notification is missed.
pub const DEFAULT_MAX_WAIT_TICK_MS: u64 = 1000;

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Limits for one resource's token bucket.
///
/// ## Examples
///
/// ```rust
/// use ratecache::BucketConfig;
///
/// // An upstream API allowing 200 requests per hour
/// let config = BucketConfig::per_hour(200);
/// assert_eq!(config.max_tokens, 200.0);
/// assert!((config.refill_per_second - 0.0555).abs() < 0.001);
///
/// // 10 req/sec sustained, bursts of up to 50
/// let config = BucketConfig::per_second(10).with_burst(50.0);
/// assert_eq!(config.max_tokens, 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum number of tokens the bucket can hold (burst capacity).
    pub max_tokens: f64,

    /// Tokens added per second of elapsed time.
    pub refill_per_second: f64,
}

impl BucketConfig {
    /// Creates a bucket configuration from raw parameters.
    pub fn new(max_tokens: f64, refill_per_second: f64) -> Self {
        Self {
            max_tokens,
            refill_per_second,
        }
    }

    /// `requests` per second, with a burst of `requests`.
    pub fn per_second(requests: u32) -> Self {
        Self::new(requests as f64, requests as f64)
    }

    /// `requests` per minute, with a burst of `requests`.
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests as f64, requests as f64 / SECONDS_PER_MINUTE)
    }

    /// `requests` per hour, with a burst of `requests`.
    ///
    /// This is the shape most published platform quotas take.
    pub fn per_hour(requests: u32) -> Self {
        Self::new(requests as f64, requests as f64 / SECONDS_PER_HOUR)
    }

    /// Overrides the burst capacity, keeping the refill rate.
    pub fn with_burst(mut self, max_tokens: f64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Seconds needed to refill an empty bucket completely.
    pub fn full_refill_secs(&self) -> f64 {
        if self.refill_per_second > 0.0 {
            self.max_tokens / self.refill_per_second
        } else {
            f64::INFINITY
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_tokens` is not a finite number greater than 0
    /// - `refill_per_second` is not a finite number greater than 0
    ///
    /// ```rust
    /// use ratecache::BucketConfig;
    ///
    /// assert!(BucketConfig::new(0.0, 1.0).validate().is_err());
    /// assert!(BucketConfig::new(10.0, 1.0).validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_tokens.is_finite() || self.max_tokens <= 0.0 {
            return Err(ConfigError::new(
                "max_tokens",
                "must be a finite number greater than 0",
            ));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err(ConfigError::new(
                "refill_per_second",
                "must be a finite number greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for BucketConfig {
    /// 10 requests per second with a burst of 10.
    fn default() -> Self {
        Self::per_second(10)
    }
}

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// Each named resource (one per upstream platform) gets its own bucket.
/// Requests for resources not listed here fall back to `default_limits`,
/// or are rejected when there is none.
///
/// ```rust
/// use ratecache::{BucketConfig, SchedulerConfig};
///
/// let config = SchedulerConfig::default()
///     .with_resource("twitter", BucketConfig::per_hour(200))
///     .with_resource("github", BucketConfig::per_hour(5000))
///     .with_max_wait_tick_ms(250);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.limits_for("github").unwrap().max_tokens, 5000.0);
/// assert!(config.limits_for("myspace").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Bucket limits keyed by resource name.
    pub resources: BTreeMap<String, BucketConfig>,

    /// Limits applied to resources missing from `resources`.
    pub default_limits: Option<BucketConfig>,

    /// Upper bound on a single drain-loop sleep, in milliseconds.
    pub max_wait_tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            default_limits: None,
            max_wait_tick_ms: DEFAULT_MAX_WAIT_TICK_MS,
        }
    }
}

impl SchedulerConfig {
    /// Adds (or replaces) the limits for a named resource.
    pub fn with_resource(mut self, name: impl Into<String>, limits: BucketConfig) -> Self {
        self.resources.insert(name.into(), limits);
        self
    }

    /// Sets the fallback limits for unlisted resources.
    pub fn with_default_limits(mut self, limits: BucketConfig) -> Self {
        self.default_limits = Some(limits);
        self
    }

    /// Sets the bounded drain-loop tick.
    pub fn with_max_wait_tick_ms(mut self, ms: u64) -> Self {
        self.max_wait_tick_ms = ms;
        self
    }

    /// Looks up the limits that apply to `resource`.
    pub fn limits_for(&self, resource: &str) -> Option<BucketConfig> {
        self.resources
            .get(resource)
            .copied()
            .or(self.default_limits)
    }

    /// Validates every bucket and the tick.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_wait_tick_ms == 0 {
            return Err(ConfigError::new(
                "max_wait_tick_ms",
                "must be greater than 0",
            ));
        }
        for limits in self.resources.values() {
            limits.validate()?;
        }
        if let Some(limits) = &self.default_limits {
            limits.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_factories() {
        let config = BucketConfig::per_second(5);
        assert_eq!(config.max_tokens, 5.0);
        assert_eq!(config.refill_per_second, 5.0);

        let config = BucketConfig::per_minute(120);
        assert_eq!(config.max_tokens, 120.0);
        assert_eq!(config.refill_per_second, 2.0);

        let config = BucketConfig::per_hour(3600);
        assert_eq!(config.refill_per_second, 1.0);
    }

    #[test]
    fn test_per_hour_quota() {
        let config = BucketConfig::per_hour(200);
        assert!((config.refill_per_second - 200.0 / 3600.0).abs() < f64::EPSILON);
        assert!((config.full_refill_secs() - 3600.0).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_validation() {
        assert!(BucketConfig::default().validate().is_ok());

        let err = BucketConfig::new(0.0, 1.0).validate().unwrap_err();
        assert_eq!(err.field, "max_tokens");

        let err = BucketConfig::new(10.0, 0.0).validate().unwrap_err();
        assert_eq!(err.field, "refill_per_second");

        assert!(BucketConfig::new(f64::NAN, 1.0).validate().is_err());
        assert!(BucketConfig::new(10.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_with_burst() {
        let config = BucketConfig::per_second(10).with_burst(50.0);
        assert_eq!(config.max_tokens, 50.0);
        assert_eq!(config.refill_per_second, 10.0);
    }

    #[test]
    fn test_scheduler_config_lookup() {
        let config = SchedulerConfig::default()
            .with_resource("twitter", BucketConfig::per_hour(200));

        assert!(config.limits_for("twitter").is_some());
        assert!(config.limits_for("reddit").is_none());

        let config = config.with_default_limits(BucketConfig::per_minute(60));
        assert_eq!(config.limits_for("reddit").unwrap().max_tokens, 60.0);
        assert_eq!(config.limits_for("twitter").unwrap().max_tokens, 200.0);
    }

    #[test]
    fn test_scheduler_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());

        let config = SchedulerConfig::default().with_max_wait_tick_ms(0);
        assert_eq!(config.validate().unwrap_err().field, "max_wait_tick_ms");

        let config = SchedulerConfig::default()
            .with_resource("bad", BucketConfig::new(-1.0, 1.0));
        assert!(config.validate().is_err());

        let config =
            SchedulerConfig::default().with_default_limits(BucketConfig::new(1.0, 0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_config_from_json() {
        let json = r#"{
            "resources": {
                "twitter": { "max_tokens": 200.0, "refill_per_second": 0.0555 },
                "github": { "max_tokens": 5000.0, "refill_per_second": 1.3889 }
            },
            "max_wait_tick_ms": 500
        }"#;

        let config: SchedulerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.max_wait_tick_ms, 500);
        assert!(config.default_limits.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_config_json_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.max_wait_tick_ms, DEFAULT_MAX_WAIT_TICK_MS);
    }
}
