//! Error types for the scheduler.
//!
//! The error taxonomy follows three tiers:
//!
//! - **Precondition violations** ([`ConfigError`], [`ScheduleError::ZeroInterval`]):
//!   caller bugs, surfaced immediately at the call site, never retried.
//! - **Lifecycle errors** ([`ScheduleError::Stopped`], [`HandleError`]):
//!   operations against a scheduler or handle that has moved past the state
//!   the operation requires.
//! - **Per-job failures**: a panicking job is caught and logged at the sweep
//!   boundary and never surfaces to callers at all; see [`crate::wheel`].

use std::time::Duration;

/// Error returned for invalid construction-time configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The tick duration must be strictly positive.
    #[error("tick duration must be greater than zero, got {0:?}")]
    ZeroTickDuration(Duration),

    /// The wheel must have at least one bucket.
    #[error("wheel size must be greater than zero")]
    ZeroWheelSize,
}

/// Error returned when scheduling or lifecycle operations are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The scheduler has been stopped; no new work is accepted.
    #[error("cannot schedule after the wheel has stopped")]
    Stopped,

    /// `start` was called on a scheduler that is already running or stopped.
    #[error("the wheel has already been started")]
    AlreadyStarted,

    /// A repeating schedule requires a non-zero interval.
    #[error("repeat interval must be greater than zero")]
    ZeroInterval,
}

/// Error returned by operations on a [`crate::CancellationHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The handle has been disposed; only observation remains legal.
    #[error("cancellation handle has been disposed")]
    Disposed,

    /// The owning scheduler is stopped or gone; a deferred cancel cannot be
    /// scheduled.
    #[error("scheduler is stopped; cannot schedule a deferred cancel")]
    SchedulerStopped,
}
