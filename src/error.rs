//! # Error Types
//!
//! Errors surfaced by the scheduler, the cache configuration and the
//! cached fetch path.
//!
//! ```text
//!     schedule(...)
//!        │
//!        ├─ rejected before queuing ──► ScheduleError::Admission(AdmissionError)
//!        ├─ operation returned Err(e) ─► ScheduleError::Operation(e)   (verbatim)
//!        ├─ operation panicked ───────► ScheduleError::Panicked
//!        └─ drain loop vanished ──────► ScheduleError::Abandoned
//! ```
//!
//! A cache miss is never an error; it is `None`.

use std::fmt;

/// Invalid configuration for a bucket, scheduler or cache.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    /// Name of the offending configuration field.
    pub field: &'static str,
    /// Why the value was rejected.
    pub reason: &'static str,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

/// Reasons a request is refused before it ever reaches the wait queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    /// No bucket is configured for the resource and no default limits exist.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The request costs more than the bucket can ever hold, so it could
    /// never be admitted.
    #[error("cost {cost} exceeds bucket capacity {max_tokens}")]
    CostExceedsCapacity {
        /// Requested cost.
        cost: f64,
        /// Capacity of the resource's bucket.
        max_tokens: f64,
    },

    /// Cost is negative, NaN or infinite.
    #[error("invalid cost: {0}")]
    InvalidCost(f64),
}

/// Error returned by [`Scheduler::schedule`](crate::Scheduler::schedule).
///
/// `E` is the error type of the scheduled operation; it is passed through
/// untouched in [`ScheduleError::Operation`].
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError<E> {
    /// The request was refused at admission and never queued.
    #[error("request not admitted: {0}")]
    Admission(#[from] AdmissionError),

    /// The operation ran and failed.
    #[error("operation failed: {0}")]
    Operation(E),

    /// The operation panicked while running.
    #[error("operation panicked")]
    Panicked,

    /// The drain loop holding the request was cancelled before the
    /// operation finished, typically because the runtime hosting the loop
    /// shut down. Applies to requests still waiting and to the one being run.
    #[error("queued request was abandoned before execution")]
    Abandoned,
}

impl<E> ScheduleError<E> {
    /// Returns the operation's own error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the operation itself ran and failed.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Maps the operation error, leaving the other variants intact.
    pub fn map_operation<F, O>(self, f: O) -> ScheduleError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::Admission(err) => ScheduleError::Admission(err),
            Self::Operation(err) => ScheduleError::Operation(f(err)),
            Self::Panicked => ScheduleError::Panicked,
            Self::Abandoned => ScheduleError::Abandoned,
        }
    }
}

/// Which variant a [`ScheduleError`] is, without its payload.
///
/// Handy for logging and for tests that don't care about the operation
/// error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleErrorKind {
    /// See [`ScheduleError::Admission`].
    Admission,
    /// See [`ScheduleError::Operation`].
    Operation,
    /// See [`ScheduleError::Panicked`].
    Panicked,
    /// See [`ScheduleError::Abandoned`].
    Abandoned,
}

impl<E> ScheduleError<E> {
    /// Returns the payload-free kind of this error.
    pub fn kind(&self) -> ScheduleErrorKind {
        match self {
            Self::Admission(_) => ScheduleErrorKind::Admission,
            Self::Operation(_) => ScheduleErrorKind::Operation,
            Self::Panicked => ScheduleErrorKind::Panicked,
            Self::Abandoned => ScheduleErrorKind::Abandoned,
        }
    }
}

impl fmt::Display for ScheduleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admission => "admission",
            Self::Operation => "operation",
            Self::Panicked => "panicked",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}
