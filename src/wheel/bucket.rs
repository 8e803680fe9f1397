//! One slot of the wheel: intrusive lists of registrations sharing a
//! tick-modulus.
//!
//! A bucket owns two doubly linked lists over the registration arena: the
//! primary list of waiting registrations, and a reschedule list holding
//! repeating registrations that fired during the current sweep. Reinsertion
//! into a future bucket happens only after the full sweep completes;
//! reinserting mid-sweep into a bucket still being iterated (including this
//! one, on wraparound) would corrupt the traversal.

use super::registration::Registration;
use crate::util::arena::{Arena, Key};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A wheel slot holding registrations whose deadline tick hashes to it.
///
/// Invariant: `head == None ⇔ tail == None`; traversal from `head` via
/// `next` reaches `tail`, and from `tail` via `prev` reaches `head`. Only
/// the sweep thread touches either list.
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    head: Option<Key>,
    tail: Option<Key>,
    resched_head: Option<Key>,
    resched_tail: Option<Key>,
}

enum Outcome {
    /// Cancelled before running: unlink and discard.
    Cancelled,
    /// Deadline reached: run, then unlink (and requeue if repeating).
    Due,
    /// Still has revolutions to survive: leave linked.
    Wait,
}

impl Bucket {
    /// Appends a registration to the tail of the primary list. O(1),
    /// FIFO-preserving.
    pub(crate) fn add(&mut self, arena: &mut Arena<Registration>, key: Key) {
        let prev_tail = self.tail;
        {
            let reg = arena.get_mut(key).expect("adding stale registration key");
            debug_assert!(
                reg.next.is_none() && reg.prev.is_none(),
                "registration already linked"
            );
            reg.prev = prev_tail;
            reg.next = None;
        }
        if let Some(tail) = prev_tail {
            arena
                .get_mut(tail)
                .expect("bucket tail points to vacant slot")
                .next = Some(key);
        } else {
            self.head = Some(key);
        }
        self.tail = Some(key);
    }

    /// Sweeps the entire primary list once, left to right.
    ///
    /// For each entry: a cancelled registration is unlinked without running;
    /// a due registration runs (panics are caught and logged, never stopping
    /// the sweep) and is unlinked, moving to the reschedule list if it
    /// repeats; a registration with revolutions remaining has its round
    /// count decremented.
    ///
    /// Returns the number of jobs run.
    ///
    /// # Panics
    ///
    /// Panics if an entry with no rounds remaining has a deadline ahead of
    /// `current_tick`: the entry was placed in the wrong bucket, which means
    /// the scheduling arithmetic itself is broken. This is surfaced loudly
    /// rather than silently corrected.
    pub(crate) fn execute(&mut self, arena: &mut Arena<Registration>, current_tick: u64) -> usize {
        let mut fired = 0;
        let mut cursor = self.head;

        while let Some(key) = cursor {
            let (next, outcome) = {
                let reg = arena.get_mut(key).expect("bucket link to vacant slot");
                let next = reg.next;
                if reg.is_cancelled() {
                    (next, Outcome::Cancelled)
                } else if reg.remaining_rounds <= 0 {
                    assert!(
                        reg.deadline <= current_tick,
                        "registration deadline {} is ahead of sweep tick {current_tick}: \
                         wrong-bucket placement",
                        reg.deadline
                    );
                    (next, Outcome::Due)
                } else {
                    reg.remaining_rounds -= 1;
                    (next, Outcome::Wait)
                }
            };

            match outcome {
                Outcome::Cancelled => {
                    self.unlink(arena, key);
                    drop(arena.remove(key));
                }
                Outcome::Due => {
                    run_job(arena.get(key).expect("bucket link to vacant slot"), current_tick);
                    fired += 1;
                    self.unlink(arena, key);
                    if arena.get(key).is_some_and(Registration::repeats) {
                        self.push_reschedule(arena, key);
                    } else {
                        drop(arena.remove(key));
                    }
                }
                Outcome::Wait => {}
            }

            cursor = next;
        }

        fired
    }

    /// Detaches the whole reschedule list and returns its keys in FIFO
    /// order, links reset.
    pub(crate) fn take_reschedule(&mut self, arena: &mut Arena<Registration>) -> Vec<Key> {
        let mut keys = Vec::new();
        let mut cursor = self.resched_head;
        while let Some(key) = cursor {
            let reg = arena.get_mut(key).expect("reschedule link to vacant slot");
            cursor = reg.next;
            reg.reset();
            keys.push(key);
        }
        self.resched_head = None;
        self.resched_tail = None;
        keys
    }

    /// Moves every non-cancelled registration of the primary list into
    /// `out`, removing them from the arena. Cancelled entries are discarded.
    pub(crate) fn drain_into(&mut self, arena: &mut Arena<Registration>, out: &mut Vec<Registration>) {
        while let Some(key) = self.head {
            self.unlink(arena, key);
            let reg = arena.remove(key).expect("bucket link to vacant slot");
            if !reg.is_cancelled() {
                out.push(reg);
            }
        }
    }

    /// As [`Bucket::drain_into`], for the reschedule list.
    pub(crate) fn drain_reschedule_into(
        &mut self,
        arena: &mut Arena<Registration>,
        out: &mut Vec<Registration>,
    ) {
        let mut cursor = self.resched_head;
        self.resched_head = None;
        self.resched_tail = None;
        while let Some(key) = cursor {
            let next = arena.get(key).expect("reschedule link to vacant slot").next;
            let mut reg = arena.remove(key).expect("reschedule link to vacant slot");
            reg.reset();
            cursor = next;
            if !reg.is_cancelled() {
                out.push(reg);
            }
        }
    }

    /// Returns true if both lists are empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none() && self.resched_head.is_none()
    }

    /// O(1) unlink from the primary list, preserving head/tail consistency.
    /// Always resets the registration's links.
    fn unlink(&mut self, arena: &mut Arena<Registration>, key: Key) {
        let (prev, next) = {
            let reg = arena.get(key).expect("unlinking stale registration key");
            (reg.prev, reg.next)
        };

        match prev {
            Some(prev_key) => {
                arena
                    .get_mut(prev_key)
                    .expect("prev link to vacant slot")
                    .next = next;
            }
            None => self.head = next,
        }
        match next {
            Some(next_key) => {
                arena
                    .get_mut(next_key)
                    .expect("next link to vacant slot")
                    .prev = prev;
            }
            None => self.tail = prev,
        }

        arena
            .get_mut(key)
            .expect("unlinking stale registration key")
            .reset();
    }

    /// Appends a fired repeating registration to the reschedule list.
    fn push_reschedule(&mut self, arena: &mut Arena<Registration>, key: Key) {
        let prev_tail = self.resched_tail;
        {
            let reg = arena.get_mut(key).expect("requeueing stale registration key");
            debug_assert!(
                reg.next.is_none() && reg.prev.is_none(),
                "registration still linked"
            );
            reg.prev = prev_tail;
            reg.next = None;
        }
        if let Some(tail) = prev_tail {
            arena
                .get_mut(tail)
                .expect("reschedule tail points to vacant slot")
                .next = Some(key);
        } else {
            self.resched_head = Some(key);
        }
        self.resched_tail = Some(key);
    }
}

/// Runs one job, isolating panics at the sweep boundary.
fn run_job(reg: &Registration, tick: u64) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| reg.job.run())) {
        let panic_message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        tracing::error!(
            job = %reg.job.describe(),
            tick,
            panic = %panic_message,
            "scheduled job panicked; sweep continues"
        );
    }
}
