//! The internal node representing one scheduled work item.

use crate::cancel::CancelSignal;
use crate::job::WorkItem;
use crate::util::arena::Key;
use std::fmt;
use std::sync::Arc;

/// One scheduled unit of work, owned by whichever bucket list currently
/// holds it.
///
/// A registration is in exactly one bucket's primary list, or one bucket's
/// reschedule list, or no list at all. The intrusive `next`/`prev` links are
/// written only by the sweep thread; [`Registration::reset`] clears them
/// exactly once on full detach.
pub(crate) struct Registration {
    /// What to run.
    pub(crate) job: Box<dyn WorkItem>,
    /// Shared cancellation signal, also held by the caller's handle.
    pub(crate) signal: Arc<CancelSignal>,
    /// Absolute tick at which the item becomes eligible to run.
    pub(crate) deadline: u64,
    /// Full wheel revolutions to survive before the deadline tick is reached.
    pub(crate) remaining_rounds: i64,
    /// Repeat interval in ticks; zero means one-shot.
    pub(crate) offset: u64,
    pub(crate) next: Option<Key>,
    pub(crate) prev: Option<Key>,
}

impl Registration {
    pub(crate) fn new(
        job: Box<dyn WorkItem>,
        signal: Arc<CancelSignal>,
        deadline: u64,
        offset: u64,
    ) -> Self {
        Self {
            job,
            signal,
            deadline,
            remaining_rounds: 0,
            offset,
            next: None,
            prev: None,
        }
    }

    /// True iff the associated cancellation handle has been signalled.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// True iff the registration fires more than once.
    pub(crate) fn repeats(&self) -> bool {
        self.offset > 0
    }

    /// Clears both list links. Called exactly once when the registration is
    /// fully detached from a list.
    pub(crate) fn reset(&mut self) {
        self.next = None;
        self.prev = None;
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("job", &self.job.describe())
            .field("deadline", &self.deadline)
            .field("remaining_rounds", &self.remaining_rounds)
            .field("offset", &self.offset)
            .field("cancelled", &self.is_cancelled())
            .field("next", &self.next)
            .field("prev", &self.prev)
            .finish()
    }
}
