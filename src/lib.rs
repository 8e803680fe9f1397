//! Metronome: a hashed-wheel timer scheduler.
//!
//! # Overview
//!
//! Metronome schedules very large numbers of one-shot and repeating units of
//! deferred work (callbacks and deferred message deliveries) with O(1)
//! amortized insertion and cancellation, without allocating a native timer or
//! thread per task. A single dedicated worker thread advances a fixed-size
//! wheel of buckets, one tick per tick-duration; every pending job lives in
//! the bucket its deadline hashes to.
//!
//! # Core Guarantees
//!
//! - **One thread, many timers**: all sweeps and job executions happen
//!   sequentially on the worker thread; callers only touch lock-free state
//! - **Cooperative cancellation**: cancelling flips a flag; the sweep observes
//!   it before running, so a job is either skipped or already executed, never
//!   half-run
//! - **Fault isolation**: a panicking job is caught and logged at the sweep
//!   boundary; sibling jobs and subsequent ticks are unaffected
//! - **Monotonic time**: all deadline math uses an injectable monotonic
//!   source, so wall-clock adjustments never cause missed or premature fires
//! - **Deterministic testing**: the wheel core and the clock are both
//!   drivable without real sleeps
//!
//! # Module Structure
//!
//! - [`clock`]: Monotonic time source abstraction and virtual clock
//! - [`job`]: Work item trait plus callback and deferred-send adapters
//! - [`cancel`]: Cancellation handles shared between callers and the wheel
//! - [`wheel`]: Buckets, registrations, and the single-threaded wheel core
//! - [`scheduler`]: The public driver: scheduling surface and worker loop
//! - [`config`]: Construction-time configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```ignore
//! use metronome::{ActionJob, SchedulerConfig, TimerScheduler};
//! use std::time::Duration;
//!
//! let scheduler = TimerScheduler::new(SchedulerConfig::new())?;
//! scheduler.start()?;
//!
//! let handle = scheduler.schedule_once(
//!     Duration::from_millis(500),
//!     ActionJob::new(|| println!("fired")),
//! )?;
//!
//! // Changed our mind:
//! handle.cancel()?;
//!
//! let pending = scheduler.stop();
//! assert!(pending.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod scheduler;
pub mod test_utils;
pub mod wheel;

mod util;

pub use cancel::CancellationHandle;
pub use clock::{MonotonicClock, Time, TimeSource, VirtualClock};
pub use config::SchedulerConfig;
pub use error::{ConfigError, HandleError, ScheduleError};
pub use job::{ActionJob, Endpoint, Envelope, SendJob, WorkItem};
pub use scheduler::{PendingWork, TimerScheduler};
pub use wheel::{delay_ticks, placement, Placement};
