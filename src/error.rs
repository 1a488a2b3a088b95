//! Error types for timer operations.
//!
//! All errors are explicit, typed, and recoverable - no panics in the
//! scheduling path. Worker faults are the one asynchronous case: they
//! surface through [`Timer::shutdown`](crate::Timer::shutdown) after the
//! panic hook has already fired at the panic site.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Error type for timer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    // Argument errors, rejected before the task is queued
    #[error("negative delay: {millis} ms")]
    NegativeDelay { millis: i64 },

    #[error("non-positive period: {millis} ms")]
    NonPositivePeriod { millis: i64 },

    #[error("scheduled time {time} is before the unix epoch")]
    TimeBeforeEpoch { time: DateTime<Utc> },

    // Illegal-state errors
    #[error("timer has been cancelled")]
    Cancelled,

    // Worker faults, surfaced on shutdown
    #[error("timer worker panicked: {reason}")]
    WorkerPanicked { reason: String },

    #[error("no tokio runtime available: {reason}")]
    RuntimeUnavailable { reason: String },
}

impl TimerError {
    /// Create a negative-delay error from the offending delay.
    #[must_use]
    pub fn negative_delay(delay: Duration) -> Self {
        Self::NegativeDelay {
            millis: delay.num_milliseconds(),
        }
    }

    /// Create a non-positive-period error from the offending period.
    #[must_use]
    pub fn non_positive_period(period: Duration) -> Self {
        Self::NonPositivePeriod {
            millis: period.num_milliseconds(),
        }
    }

    /// Create a before-epoch error from the offending time.
    #[must_use]
    pub fn time_before_epoch(time: DateTime<Utc>) -> Self {
        Self::TimeBeforeEpoch { time }
    }

    /// Create a worker-panicked error.
    #[must_use]
    pub fn worker_panicked(reason: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            reason: reason.into(),
        }
    }

    /// Create a runtime-unavailable error.
    #[must_use]
    pub fn runtime_unavailable(reason: impl Into<String>) -> Self {
        Self::RuntimeUnavailable {
            reason: reason.into(),
        }
    }

    /// Check if the error is an argument error.
    ///
    /// Argument errors are reported before the timer's state is consulted,
    /// so they win when several violations apply at once.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::NegativeDelay { .. } | Self::NonPositivePeriod { .. } | Self::TimeBeforeEpoch { .. }
        )
    }
}

/// Result type for timer operations.
pub type Result<T> = std::result::Result<T, TimerError>;
