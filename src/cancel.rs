//! Cooperative cancellation handles.
//!
//! Cancellation never touches the wheel's lists directly: [`CancellationHandle::cancel`]
//! flips an atomic flag, and the sweep thread unlinks the registration the
//! next time it visits the owning bucket. The flag check happens before the
//! execute check inside the single-threaded sweep, so a registration is
//! either removed without running (cancellation observed in time) or already
//! executed (cancellation arrived too late), never half-run.
//!
//! Handle states: `Active → Cancelled` (terminal), plus an orthogonal
//! `Disposed` marker after which mutating operations fail. Disposing an
//! already-cancelled or never-cancelled handle is legal and idempotent.

use crate::error::HandleError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shared cancellation state, referenced by both the caller-held handle and
/// the registration inside the wheel.
pub(crate) struct CancelSignal {
    cancelled: AtomicBool,
    disposed: AtomicBool,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Flips the cancelled flag. Idempotent; returns true on the first flip.
    pub(crate) fn request_cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Internal hook for scheduling a deferred cancel through the wheel.
///
/// Implemented by the scheduler's shared state; the handle holds it weakly so
/// a dropped scheduler fails the call instead of leaking work.
pub(crate) trait DeferredCancel: Send + Sync {
    fn schedule_cancel(
        &self,
        delay: Duration,
        signal: Arc<CancelSignal>,
    ) -> Result<(), HandleError>;
}

/// Caller-held token for cancelling a scheduled work item.
///
/// The handle is independent of the wheel's internal lists and remains valid
/// for the registration's whole lifetime. Cloning yields another reference to
/// the same underlying signal.
#[derive(Clone)]
pub struct CancellationHandle {
    signal: Arc<CancelSignal>,
    scheduler: Weak<dyn DeferredCancel>,
}

impl CancellationHandle {
    pub(crate) fn new(signal: Arc<CancelSignal>, scheduler: Weak<dyn DeferredCancel>) -> Self {
        Self { signal, scheduler }
    }

    /// Requests cancellation.
    ///
    /// Idempotent: calling this on an already-cancelled handle succeeds and
    /// does nothing. The registration itself is unlinked lazily by the sweep
    /// thread; if the sweep has already executed the job, cancellation
    /// arrived too late and this call still succeeds.
    pub fn cancel(&self) -> Result<(), HandleError> {
        if self.signal.is_disposed() {
            return Err(HandleError::Disposed);
        }
        self.signal.request_cancel();
        Ok(())
    }

    /// Schedules cancellation after `delay`, via the same wheel.
    ///
    /// The deferred cancel is itself tick-quantized work: it takes effect no
    /// earlier than `delay` and within one tick after it.
    pub fn cancel_after(&self, delay: Duration) -> Result<(), HandleError> {
        if self.signal.is_disposed() {
            return Err(HandleError::Disposed);
        }
        let scheduler = self
            .scheduler
            .upgrade()
            .ok_or(HandleError::SchedulerStopped)?;
        scheduler.schedule_cancel(delay, Arc::clone(&self.signal))
    }

    /// Returns true if cancellation has been requested.
    ///
    /// Valid in every state, including after disposal.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Releases the handle.
    ///
    /// Idempotent. Subsequent `cancel`/`cancel_after` calls fail with
    /// [`HandleError::Disposed`]; observation stays legal.
    pub fn dispose(&self) {
        self.signal.dispose();
    }

    /// Returns true if the handle has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.signal.is_disposed()
    }
}

impl fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancellation_requested())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
