//! The hashed wheel core: bucket array, tick arithmetic, sweeps.
//!
//! The core is single-threaded by design: it is owned by the driver's
//! worker thread, which is the only writer of any bucket list or
//! registration link. Cross-thread concerns (staging, cancellation flags,
//! lifecycle) live in [`crate::scheduler`]; this module can therefore be
//! driven tick by tick in tests without threads or sleeps.
//!
//! # Placement
//!
//! A registration with absolute deadline tick `D` inserted while tick `R` is
//! the earliest tick the sweep can still visit lands in bucket `D mod N`
//! with `(D − R) / N` remaining revolutions. For staged transfers `R` is the
//! tick about to be swept; for post-sweep reschedules `R` is the tick after
//! the one just swept, which makes whole-revolution repeat offsets fire
//! after exactly one revolution instead of two.

mod bucket;
mod registration;

pub(crate) use registration::Registration;

use crate::util::arena::Arena;
use bucket::Bucket;
use std::time::Duration;

/// Bucket index and revolution count for one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index of the destination bucket.
    pub bucket: usize,
    /// Full wheel revolutions the registration must survive before its
    /// deadline tick is reached.
    pub rounds: i64,
}

/// Computes the destination bucket and remaining revolutions for a deadline.
///
/// `reference` is the earliest tick the sweep can still visit. A deadline at
/// or before it is clamped into that tick with zero rounds, so overdue work
/// fires on the very next sweep instead of tripping the wrong-bucket check.
/// `wheel_size` must be a power of two.
#[must_use]
pub fn placement(deadline: u64, reference: u64, wheel_size: u64) -> Placement {
    debug_assert!(wheel_size.is_power_of_two(), "wheel size must be a power of two");
    let effective = deadline.max(reference);
    let rounds = (effective - reference) / wheel_size;
    Placement {
        bucket: (effective & (wheel_size - 1)) as usize,
        rounds: i64::try_from(rounds).unwrap_or(i64::MAX),
    }
}

/// Converts a delay to a whole number of ticks, rounding up.
///
/// The wheel enforces a minimum delay quantized to tick granularity: a
/// non-zero delay never fires early, and a zero delay fires on the next
/// tick.
#[must_use]
pub fn delay_ticks(delay: Duration, tick_duration: Duration) -> u64 {
    let tick_ns = tick_duration.as_nanos().max(1);
    delay
        .as_nanos()
        .div_ceil(tick_ns)
        .min(u128::from(u64::MAX)) as u64
}

/// The bucket array plus the registration arena.
///
/// Owned exclusively by the driver's worker thread.
pub(crate) struct Wheel {
    buckets: Vec<Bucket>,
    arena: Arena<Registration>,
    size: u64,
}

impl Wheel {
    /// Creates a wheel with `size` buckets. `size` must be a power of two.
    pub(crate) fn new(size: u64) -> Self {
        assert!(size.is_power_of_two(), "wheel size must be a power of two");
        let mut buckets = Vec::with_capacity(size as usize);
        buckets.resize_with(size as usize, Bucket::default);
        Self {
            buckets,
            arena: Arena::new(),
            size,
        }
    }

    /// Number of registrations currently held (waiting or queued for
    /// reschedule).
    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    /// Inserts a registration, computing its bucket and rounds relative to
    /// `reference_tick`, the tick about to be swept.
    pub(crate) fn insert(&mut self, mut reg: Registration, reference_tick: u64) {
        let slot = placement(reg.deadline, reference_tick, self.size);
        reg.remaining_rounds = slot.rounds;
        let key = self.arena.insert(reg);
        self.buckets[slot.bucket].add(&mut self.arena, key);
    }

    /// Sweeps the bucket for `tick`, then reinserts whatever the sweep
    /// queued for reschedule. Returns the number of jobs run.
    pub(crate) fn process_tick(&mut self, tick: u64) -> usize {
        let index = (tick & (self.size - 1)) as usize;
        let fired = self.buckets[index].execute(&mut self.arena, tick);

        // Two-phase reschedule: reinsertion happens only after the sweep has
        // fully completed, never into a list still being iterated.
        let requeued = self.buckets[index].take_reschedule(&mut self.arena);
        for key in requeued {
            if self.arena.get(key).is_some_and(Registration::is_cancelled) {
                drop(self.arena.remove(key));
                continue;
            }
            let deadline = {
                let reg = self.arena.get_mut(key).expect("rescheduled key vacant");
                reg.deadline = tick.saturating_add(reg.offset);
                reg.deadline
            };
            let slot = placement(deadline, tick + 1, self.size);
            self.arena
                .get_mut(key)
                .expect("rescheduled key vacant")
                .remaining_rounds = slot.rounds;
            self.buckets[slot.bucket].add(&mut self.arena, key);
        }

        fired
    }

    /// Empties every bucket's primary and reschedule lists, returning the
    /// non-cancelled registrations.
    pub(crate) fn drain(&mut self) -> Vec<Registration> {
        let mut out = Vec::new();
        for bucket in &mut self.buckets {
            bucket.drain_into(&mut self.arena, &mut out);
            bucket.drain_reschedule_into(&mut self.arena, &mut out);
        }
        debug_assert!(self.arena.is_empty(), "drain left registrations behind");
        out
    }
}

impl std::fmt::Debug for Wheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wheel")
            .field("size", &self.size)
            .field("registrations", &self.arena.len())
            .finish()
    }
}
