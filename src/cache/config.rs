//! # Cache Configuration
//!
//! Capacity, default time-to-live and sweep period for a [`TtlCache`].
//!
//! ```text
//!     ┌──────────────────────────────────────┐
//!     │ max_size: 1000          ← entry cap  │
//!     │ default_ttl_ms: 300000  ← 5 minutes  │
//!     │ sweep_interval_ms: 60000 ← 1 minute  │
//!     └──────────────────────────────────────┘
//! ```
//!
//! [`TtlCache`]: crate::TtlCache

use crate::error::ConfigError;
use crate::utils::millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one cache instance (one per logical data type).
///
/// ```rust
/// use ratecache::CacheConfig;
///
/// // 500 profiles, 10 minute TTL, swept every 30 seconds
/// let config = CacheConfig::new(500, 600_000).with_sweep_interval_ms(30_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub max_size: usize,

    /// TTL applied by `set` when the caller gives none (milliseconds).
    pub default_ttl_ms: u64,

    /// Period of the background expiry sweep (milliseconds).
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    /// 1000 entries, 5 minute TTL, swept every minute.
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_ms: 300_000,
            sweep_interval_ms: 60_000,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the default sweep interval.
    pub fn new(max_size: usize, default_ttl_ms: u64) -> Self {
        Self {
            max_size,
            default_ttl_ms,
            ..Default::default()
        }
    }

    /// Sets the sweep period.
    pub fn with_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.sweep_interval_ms = ms;
        self
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        millis(self.default_ttl_ms)
    }

    /// Sweep period as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        millis(self.sweep_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any of `max_size`, `default_ttl_ms` or
    /// `sweep_interval_ms` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::new("max_size", "must be greater than 0"));
        }
        if self.default_ttl_ms == 0 {
            return Err(ConfigError::new("default_ttl_ms", "must be greater than 0"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::new(
                "sweep_interval_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
