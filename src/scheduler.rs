//! The timer wheel driver: scheduling surface and worker loop.
//!
//! One dedicated worker thread owns the wheel core and performs every bucket
//! sweep and job execution for a given tick sequentially. Callers interact
//! only with lock-free state: scheduling pushes a registration onto a
//! [`SegQueue`] that the worker drains at the top of every tick, and
//! cancellation flips an atomic flag the sweep observes. No mutex sits on
//! the hot path.
//!
//! The loop computes the absolute next tick boundary once at start and
//! derives successive boundaries by addition, so nominal-interval rounding
//! never accumulates drift. A late wakeup processes every elapsed boundary
//! in order, so timers assigned to skipped ticks are swept, not starved.

use crate::cancel::{CancelSignal, CancellationHandle, DeferredCancel};
use crate::clock::{MonotonicClock, TimeSource};
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, HandleError, ScheduleError};
use crate::job::{ActionJob, Endpoint, Envelope, SendJob, WorkItem};
use crate::wheel::{delay_ticks, Registration, Wheel};
use crossbeam_queue::SegQueue;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STATE_INIT: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// A registration drained out of the wheel by [`TimerScheduler::stop`].
///
/// Holds the still-pending job together with how far from firing it was;
/// callers may re-submit the job to another scheduler or discard it.
pub struct PendingWork {
    job: Box<dyn WorkItem>,
    remaining_ticks: u64,
    interval_ticks: u64,
}

impl PendingWork {
    fn from_registration(reg: Registration, current_tick: u64) -> Self {
        Self {
            remaining_ticks: reg.deadline.saturating_sub(current_tick),
            interval_ticks: reg.offset,
            job: reg.job,
        }
    }

    /// Ticks that remained until the next fire when the wheel stopped.
    #[must_use]
    pub fn remaining_ticks(&self) -> u64 {
        self.remaining_ticks
    }

    /// True if this was a repeating registration.
    #[must_use]
    pub fn repeats(&self) -> bool {
        self.interval_ticks > 0
    }

    /// The repeat interval in ticks; zero for one-shot work.
    #[must_use]
    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    /// Consumes the record, handing the job back for re-submission.
    #[must_use]
    pub fn into_job(self) -> Box<dyn WorkItem> {
        self.job
    }
}

impl fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWork")
            .field("job", &self.job.describe())
            .field("remaining_ticks", &self.remaining_ticks)
            .field("interval_ticks", &self.interval_ticks)
            .finish()
    }
}

/// State shared between the scheduling surface, cancellation handles and the
/// worker thread.
struct Shared {
    tick_duration: Duration,
    tick_nanos: u64,
    wheel_size: u64,
    clock: Arc<dyn TimeSource>,
    /// Lock-free staging queue; drained by the worker at the top of every
    /// tick.
    staged: SegQueue<Registration>,
    state: AtomicU8,
    /// Last tick the worker has begun processing.
    current_tick: AtomicU64,
    /// Registrations live in the wheel as of the last completed tick.
    live: AtomicUsize,
    park_lock: Mutex<()>,
    park_cond: Condvar,
    /// Filled by the worker on shutdown, taken by `stop`.
    drained: Mutex<Vec<PendingWork>>,
}

impl Shared {
    fn stage(&self, delay: Duration, offset: u64, job: Box<dyn WorkItem>) -> Arc<CancelSignal> {
        let ticks_to_wait = delay_ticks(delay, self.tick_duration);
        let deadline = self
            .current_tick
            .load(Ordering::Acquire)
            .saturating_add(ticks_to_wait);
        let signal = Arc::new(CancelSignal::new());
        self.staged
            .push(Registration::new(job, Arc::clone(&signal), deadline, offset));
        signal
    }

    fn is_accepting(&self) -> bool {
        self.state.load(Ordering::Acquire) < STATE_STOPPING
    }

    fn wake_worker(&self) {
        let _guard = self.park_lock.lock().unwrap();
        self.park_cond.notify_all();
    }
}

impl DeferredCancel for Shared {
    fn schedule_cancel(
        &self,
        delay: Duration,
        signal: Arc<CancelSignal>,
    ) -> Result<(), HandleError> {
        if !self.is_accepting() {
            return Err(HandleError::SchedulerStopped);
        }
        let target = Arc::clone(&signal);
        let job = ActionJob::with_label("deferred-cancel", move || {
            if !target.is_disposed() {
                target.request_cancel();
            }
        });
        let cancel_signal = self.stage(delay, 0, Box::new(job));
        if !self.is_accepting() {
            cancel_signal.request_cancel();
            return Err(HandleError::SchedulerStopped);
        }
        Ok(())
    }
}

/// A hashed-wheel timer scheduler.
///
/// Construct with a validated [`SchedulerConfig`], call
/// [`start`](Self::start) to spawn the worker, schedule work from any
/// thread, and [`stop`](Self::stop) to halt the loop and reclaim whatever
/// had not yet fired.
pub struct TimerScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerScheduler {
    /// Creates a scheduler driven by the real monotonic clock.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Creates a scheduler with an injected time source.
    pub fn with_clock(
        config: SchedulerConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            tick_duration: config.tick_duration,
            tick_nanos: config.tick_nanos(),
            wheel_size: config.normalized_wheel_size(),
            clock,
            staged: SegQueue::new(),
            state: AtomicU8::new(STATE_INIT),
            current_tick: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            park_lock: Mutex::new(()),
            park_cond: Condvar::new(),
            drained: Mutex::new(Vec::new()),
        });
        Ok(Self {
            shared,
            worker: Mutex::new(None),
        })
    }

    /// Spawns the sweeping loop.
    ///
    /// Fails with [`ScheduleError::AlreadyStarted`] on a second call and
    /// [`ScheduleError::Stopped`] once the scheduler has been stopped.
    pub fn start(&self) -> Result<(), ScheduleError> {
        match self.shared.state.compare_exchange(
            STATE_INIT,
            STATE_STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name("metronome-wheel".to_owned())
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn wheel thread");
                *self.worker.lock().unwrap() = Some(handle);
                tracing::debug!(
                    tick = ?self.shared.tick_duration,
                    wheel_size = self.shared.wheel_size,
                    "timer wheel started"
                );
                Ok(())
            }
            Err(STATE_STARTED) => Err(ScheduleError::AlreadyStarted),
            Err(_) => Err(ScheduleError::Stopped),
        }
    }

    /// Halts the sweeping loop and drains outstanding work.
    ///
    /// Returns every registration that had neither executed nor been
    /// cancelled, including work still sitting in the staging queue. No
    /// registration is both returned and executed. Idempotent: a second call
    /// returns an empty collection.
    pub fn stop(&self) -> Vec<PendingWork> {
        loop {
            match self.shared.state.load(Ordering::Acquire) {
                STATE_INIT => {
                    if self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_INIT,
                            STATE_STOPPED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        // Never started: staged entries are the only pending
                        // work.
                        let mut pending = Vec::new();
                        while let Some(reg) = self.shared.staged.pop() {
                            if !reg.is_cancelled() {
                                pending.push(PendingWork::from_registration(reg, 0));
                            }
                        }
                        return pending;
                    }
                }
                STATE_STARTED => {
                    if self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_STARTED,
                            STATE_STOPPING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.shared.wake_worker();
                        let handle = self.worker.lock().unwrap().take();
                        if let Some(handle) = handle {
                            if handle.join().is_err() {
                                tracing::error!("wheel thread panicked before shutdown");
                            }
                        }
                        self.shared.state.store(STATE_STOPPED, Ordering::Release);
                        return std::mem::take(&mut *self.shared.drained.lock().unwrap());
                    }
                }
                _ => return Vec::new(),
            }
        }
    }

    /// Schedules a one-shot job after `delay`.
    ///
    /// The job fires no earlier than `delay`, quantized up to tick
    /// granularity. The returned handle stays valid for the registration's
    /// whole lifetime.
    pub fn schedule_once(
        &self,
        delay: Duration,
        job: impl WorkItem,
    ) -> Result<CancellationHandle, ScheduleError> {
        self.schedule(delay, 0, Box::new(job))
    }

    /// Schedules a repeating job: first fire after `initial_delay`, then
    /// every `interval`.
    pub fn schedule_repeatedly(
        &self,
        initial_delay: Duration,
        interval: Duration,
        job: impl WorkItem,
    ) -> Result<CancellationHandle, ScheduleError> {
        let offset = delay_ticks(interval, self.shared.tick_duration);
        if offset == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        self.schedule(initial_delay, offset, Box::new(job))
    }

    /// Schedules a one-shot deferred message delivery.
    pub fn schedule_send_once(
        &self,
        delay: Duration,
        receiver: Arc<dyn Endpoint>,
        message: Envelope,
        sender: Option<Arc<dyn Endpoint>>,
    ) -> Result<CancellationHandle, ScheduleError> {
        self.schedule_once(delay, SendJob::new(receiver, message, sender))
    }

    /// Schedules a repeating deferred message delivery.
    pub fn schedule_send_repeatedly(
        &self,
        initial_delay: Duration,
        interval: Duration,
        receiver: Arc<dyn Endpoint>,
        message: Envelope,
        sender: Option<Arc<dyn Endpoint>>,
    ) -> Result<CancellationHandle, ScheduleError> {
        self.schedule_repeatedly(initial_delay, interval, SendJob::new(receiver, message, sender))
    }

    /// Returns true while the worker loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_STARTED
    }

    /// The last tick the worker has begun processing.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.shared.current_tick.load(Ordering::Acquire)
    }

    /// Approximate number of registrations not yet fired or cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.staged.len() + self.shared.live.load(Ordering::Acquire)
    }

    fn schedule(
        &self,
        delay: Duration,
        offset: u64,
        job: Box<dyn WorkItem>,
    ) -> Result<CancellationHandle, ScheduleError> {
        if !self.shared.is_accepting() {
            return Err(ScheduleError::Stopped);
        }
        let signal = self.shared.stage(delay, offset, job);
        if !self.shared.is_accepting() {
            // Raced with stop: the worker may already have drained staging,
            // so this entry could be neither executed nor returned. Cancel
            // it and report the rejection instead.
            signal.request_cancel();
            return Err(ScheduleError::Stopped);
        }
        let weak: Weak<dyn DeferredCancel> =
            Arc::downgrade(&(Arc::clone(&self.shared) as Arc<dyn DeferredCancel>));
        Ok(CancellationHandle::new(signal, weak))
    }
}

impl fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("tick_duration", &self.shared.tick_duration)
            .field("wheel_size", &self.shared.wheel_size)
            .field("state", &self.shared.state.load(Ordering::Acquire))
            .field("current_tick", &self.current_tick())
            .finish()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        if self.shared.state.load(Ordering::Acquire) == STATE_STARTED {
            let _ = self.stop();
        }
    }
}

/// The sweeping loop. Owns the wheel core exclusively.
fn worker_loop(shared: &Arc<Shared>) {
    let mut wheel = Wheel::new(shared.wheel_size);
    let start = shared.clock.now();
    let mut next_boundary = start.saturating_add_nanos(shared.tick_nanos);
    let mut tick: u64 = 0;

    'run: loop {
        // Wait for the next boundary; stop() interrupts via the condvar.
        loop {
            if shared.state.load(Ordering::Acquire) == STATE_STOPPING {
                break 'run;
            }
            let now = shared.clock.now();
            if now >= next_boundary {
                break;
            }
            let wait = Duration::from_nanos(next_boundary.saturating_nanos_since(now));
            let guard = shared.park_lock.lock().unwrap();
            if shared.state.load(Ordering::Acquire) == STATE_STOPPING {
                break 'run;
            }
            drop(shared.park_cond.wait_timeout(guard, wait).unwrap());
        }

        // Process every elapsed boundary in order: a late wakeup still
        // sweeps every bucket index between the last processed tick and now.
        let now = shared.clock.now();
        while next_boundary <= now {
            tick += 1;
            shared.current_tick.store(tick, Ordering::Release);
            transfer_staged(shared, &mut wheel, tick);
            let fired = wheel.process_tick(tick);
            if fired > 0 {
                tracing::trace!(tick, fired, "tick swept");
            }
            next_boundary = next_boundary.saturating_add_nanos(shared.tick_nanos);
            if shared.state.load(Ordering::Acquire) == STATE_STOPPING {
                shared.live.store(wheel.len(), Ordering::Release);
                break 'run;
            }
        }
        shared.live.store(wheel.len(), Ordering::Release);
    }

    // Drain everything still pending into the caller-visible set.
    let current = shared.current_tick.load(Ordering::Acquire);
    let mut pending: Vec<PendingWork> = wheel
        .drain()
        .into_iter()
        .map(|reg| PendingWork::from_registration(reg, current))
        .collect();
    while let Some(reg) = shared.staged.pop() {
        if !reg.is_cancelled() {
            pending.push(PendingWork::from_registration(reg, current));
        }
    }
    tracing::debug!(pending = pending.len(), tick = current, "timer wheel stopped");
    *shared.drained.lock().unwrap() = pending;
    shared.live.store(0, Ordering::Release);
}

/// Moves staged registrations into the wheel. Entries cancelled while
/// staged are dropped here without ever touching a bucket.
fn transfer_staged(shared: &Shared, wheel: &mut Wheel, tick: u64) {
    while let Some(reg) = shared.staged.pop() {
        if reg.is_cancelled() {
            continue;
        }
        wheel.insert(reg, tick);
    }
}
