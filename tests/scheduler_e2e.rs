//! Timer scheduler verification suite - E2E tests.
//!
//! Drives a real worker thread against the monotonic clock with coarse
//! ticks, covering the externally observable contract:
//!
//! 1. Quantization: never fires early, fires within tick granularity
//! 2. Cancellation wins the race against the sweep
//! 3. Repeat cadence and stability after stop
//! 4. Fault isolation between jobs sharing a bucket
//! 5. Idempotent cancellation and disposal
//! 6. Drain-on-stop exactness and re-submission
//! 7. Deferred message delivery to endpoints
//!
//! Exact tick-by-tick behavior (revolution counts, drift-free cadence over
//! a thousand cycles, wrong-bucket detection) is covered deterministically
//! by the unit tests in `src/wheel/`; these tests use generous margins so
//! they stay robust on slow CI machines.

mod common;

use common::init_test_logging;
use metronome::{
    ActionJob, Endpoint, Envelope, HandleError, SchedulerConfig, TimerScheduler, VirtualClock,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn scheduler(tick_ms: u64, wheel_size: u32) -> TimerScheduler {
    TimerScheduler::new(
        SchedulerConfig::new()
            .tick_duration(Duration::from_millis(tick_ms))
            .wheel_size(wheel_size),
    )
    .expect("valid config")
}

fn counting_job(counter: &Arc<AtomicU64>) -> ActionJob {
    let captured = Arc::clone(counter);
    ActionJob::new(move || {
        captured.fetch_add(1, Ordering::SeqCst);
    })
}

struct Mailbox {
    name: &'static str,
    received: Mutex<Vec<Envelope>>,
}

impl Mailbox {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            received: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl Endpoint for Mailbox {
    fn name(&self) -> &str {
        self.name
    }

    fn deliver(&self, message: Envelope) {
        self.received.lock().unwrap().push(message);
    }
}

// ============================================================================
// Quantization
// ============================================================================

#[test]
fn never_fires_before_the_requested_delay() {
    init_test_logging();
    let scheduler = scheduler(50, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let _handle = scheduler
        .schedule_once(Duration::from_millis(300), counting_job(&counter))
        .expect("schedule");

    sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "fired early");

    sleep(Duration::from_millis(500));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "did not fire");

    let pending = scheduler.stop();
    assert!(pending.is_empty());
}

#[test]
fn zero_delay_fires_on_the_next_tick() {
    init_test_logging();
    let scheduler = scheduler(20, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let _handle = scheduler
        .schedule_once(Duration::ZERO, counting_job(&counter))
        .expect("schedule");

    sleep(Duration::from_millis(200));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    let _ = scheduler.stop();
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn cancellation_wins_the_race() {
    init_test_logging();
    // 500ms delay on a 100ms/8 wheel, cancelled at 10ms.
    let scheduler = scheduler(100, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let handle = scheduler
        .schedule_once(Duration::from_millis(500), counting_job(&counter))
        .expect("schedule");

    sleep(Duration::from_millis(10));
    handle.cancel().expect("cancel");

    sleep(Duration::from_millis(1000));
    assert_eq!(
        counter.load(Ordering::SeqCst),
        0,
        "cancelled action must never run"
    );
    let _ = scheduler.stop();
}

#[test]
fn cancel_after_goes_through_the_same_wheel() {
    init_test_logging();
    let scheduler = scheduler(50, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let handle = scheduler
        .schedule_once(Duration::from_millis(600), counting_job(&counter))
        .expect("schedule");
    handle
        .cancel_after(Duration::from_millis(100))
        .expect("cancel_after");

    sleep(Duration::from_millis(1000));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(handle.is_cancellation_requested());
    let _ = scheduler.stop();
}

#[test]
fn cancellation_and_disposal_are_idempotent() {
    init_test_logging();
    let scheduler = scheduler(20, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let handle = scheduler
        .schedule_once(Duration::from_millis(40), counting_job(&counter))
        .expect("schedule");

    sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "fired once");

    // Cancelling after the fire is too late but still legal, twice over.
    handle.cancel().expect("late cancel");
    handle.cancel().expect("second late cancel");

    handle.dispose();
    handle.dispose();
    assert_eq!(handle.cancel(), Err(HandleError::Disposed));
    assert_eq!(
        handle.cancel_after(Duration::from_millis(10)),
        Err(HandleError::Disposed)
    );

    sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "never double-executes");
    let _ = scheduler.stop();
}

// ============================================================================
// Repeats
// ============================================================================

#[test]
fn repeating_job_fires_approximately_floor_elapsed_over_interval() {
    init_test_logging();
    let scheduler = scheduler(20, 16);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let handle = scheduler
        .schedule_repeatedly(
            Duration::from_millis(40),
            Duration::from_millis(100),
            counting_job(&counter),
        )
        .expect("schedule");

    sleep(Duration::from_millis(1040));
    let fired = counter.load(Ordering::SeqCst);
    assert!(
        (6..=14).contains(&fired),
        "expected roughly 10 fires in ~1s, got {fired}"
    );

    handle.cancel().expect("cancel");
    let _ = scheduler.stop();
    let settled = counter.load(Ordering::SeqCst);
    sleep(Duration::from_millis(200));
    assert_eq!(
        counter.load(Ordering::SeqCst),
        settled,
        "no fires after stop"
    );
}

// ============================================================================
// Fault Isolation
// ============================================================================

#[test]
fn panicking_job_does_not_affect_bucket_siblings() {
    init_test_logging();
    let scheduler = scheduler(50, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    // Same delay: all three land in the same bucket and the same sweep.
    let _first = scheduler
        .schedule_once(
            Duration::from_millis(100),
            ActionJob::with_label("faulty", || panic!("injected failure")),
        )
        .expect("schedule");
    let _second = scheduler
        .schedule_once(Duration::from_millis(100), counting_job(&counter))
        .expect("schedule");
    let _third = scheduler
        .schedule_once(Duration::from_millis(100), counting_job(&counter))
        .expect("schedule");

    sleep(Duration::from_millis(500));
    assert_eq!(
        counter.load(Ordering::SeqCst),
        2,
        "siblings of a panicking job must still execute"
    );

    // The wheel survives and keeps ticking.
    let _late = scheduler
        .schedule_once(Duration::from_millis(50), counting_job(&counter))
        .expect("schedule after panic");
    sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    let _ = scheduler.stop();
}

// ============================================================================
// Drain on Stop
// ============================================================================

#[test]
fn stop_returns_exactly_the_unfired_registrations() {
    init_test_logging();
    let scheduler = scheduler(20, 8);
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    for _ in 0..3 {
        let _ = scheduler
            .schedule_once(Duration::from_secs(30), counting_job(&counter))
            .expect("schedule");
    }
    let repeating = scheduler
        .schedule_repeatedly(
            Duration::from_secs(30),
            Duration::from_secs(30),
            counting_job(&counter),
        )
        .expect("schedule");
    let cancelled = scheduler
        .schedule_once(Duration::from_secs(30), counting_job(&counter))
        .expect("schedule");
    cancelled.cancel().expect("cancel");
    drop(repeating);

    sleep(Duration::from_millis(200));
    let pending = scheduler.stop();
    assert_eq!(pending.len(), 4, "three one-shots plus one repeating");
    assert_eq!(pending.iter().filter(|p| p.repeats()).count(), 1);
    assert!(pending.iter().all(|p| p.remaining_ticks() > 0));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "none executed");

    // A second stop has nothing left to hand back.
    assert!(scheduler.stop().is_empty());

    // Drained work can be re-submitted elsewhere.
    let fresh = TimerScheduler::new(
        SchedulerConfig::new()
            .tick_duration(Duration::from_millis(20))
            .wheel_size(8),
    )
    .expect("valid config");
    fresh.start().expect("start");
    let mut pending = pending;
    let job = pending.pop().expect("drained job").into_job();
    let _ = fresh
        .schedule_once(Duration::from_millis(40), job)
        .expect("resubmit");
    sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "resubmitted job fired");
    let _ = fresh.stop();
}

// ============================================================================
// Clock Injection
// ============================================================================

#[test]
fn virtual_clock_drives_the_wheel() {
    init_test_logging();
    let clock = Arc::new(VirtualClock::new());
    let scheduler = TimerScheduler::with_clock(
        SchedulerConfig::new()
            .tick_duration(Duration::from_millis(10))
            .wheel_size(8),
        clock.clone(),
    )
    .expect("valid config");
    let counter = Arc::new(AtomicU64::new(0));

    scheduler.start().expect("start");
    let _handle = scheduler
        .schedule_once(Duration::from_millis(50), counting_job(&counter))
        .expect("schedule");

    // Real time passes but virtual time stands still: nothing may fire.
    sleep(Duration::from_millis(150));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "virtual time is frozen");

    // Jump virtual time past the deadline; the worker catches up on every
    // skipped boundary within a couple of real polling intervals.
    clock.advance_by(Duration::from_millis(100));
    sleep(Duration::from_millis(150));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "fired after advance");
    let _ = scheduler.stop();
}

// ============================================================================
// Deferred Sends
// ============================================================================

#[test]
fn scheduled_send_delivers_the_message() {
    init_test_logging();
    let scheduler = scheduler(50, 8);
    let mailbox = Mailbox::new("orders");
    let sender = Mailbox::new("strategy");

    scheduler.start().expect("start");
    let _handle = scheduler
        .schedule_send_once(
            Duration::from_millis(100),
            mailbox.clone(),
            Arc::new("expire-order-7".to_owned()),
            Some(sender),
        )
        .expect("schedule send");

    sleep(Duration::from_millis(400));
    assert_eq!(mailbox.count(), 1);
    let received = mailbox.received.lock().unwrap();
    assert_eq!(
        received[0].downcast_ref::<String>().map(String::as_str),
        Some("expire-order-7")
    );
    drop(received);
    let _ = scheduler.stop();
}

#[test]
fn repeated_send_keeps_delivering_until_cancelled() {
    init_test_logging();
    let scheduler = scheduler(20, 16);
    let mailbox = Mailbox::new("heartbeats");

    scheduler.start().expect("start");
    let handle = scheduler
        .schedule_send_repeatedly(
            Duration::from_millis(40),
            Duration::from_millis(100),
            mailbox.clone(),
            Arc::new(0_u8),
            None,
        )
        .expect("schedule send");

    sleep(Duration::from_millis(560));
    let delivered = mailbox.count();
    assert!(
        (3..=8).contains(&delivered),
        "expected roughly 5 deliveries, got {delivered}"
    );

    handle.cancel().expect("cancel");
    sleep(Duration::from_millis(300));
    let settled = mailbox.count();
    sleep(Duration::from_millis(200));
    assert_eq!(mailbox.count(), settled, "no deliveries after cancel");
    let _ = scheduler.stop();
}
