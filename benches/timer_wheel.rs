//! Timer wheel benchmarks.
//!
//! These measure the caller-side cost of the scheduling surface:
//! - Schedule (O(1) expected: one allocation plus a lock-free push)
//! - Cancel (O(1) expected: an atomic flag flip)
//! - Placement arithmetic (pure)
//! - Large-scale staging (10K timers)
//!
//! The worker thread is given a long tick duration so sweeps do not compete
//! with the measured path.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use metronome::{delay_ticks, placement, ActionJob, SchedulerConfig, TimerScheduler};
use std::time::Duration;

fn quiet_scheduler() -> TimerScheduler {
    let scheduler = TimerScheduler::new(
        SchedulerConfig::new()
            .tick_duration(Duration::from_secs(3600))
            .wheel_size(512),
    )
    .expect("valid config");
    scheduler.start().expect("start");
    scheduler
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    group.throughput(Throughput::Elements(1));

    group.bench_function("schedule_once", |b| {
        let scheduler = quiet_scheduler();
        b.iter(|| {
            let handle = scheduler
                .schedule_once(black_box(Duration::from_secs(10)), ActionJob::new(|| {}))
                .expect("schedule");
            black_box(handle)
        });
        let _ = scheduler.stop();
    });

    group.bench_function("schedule_repeatedly", |b| {
        let scheduler = quiet_scheduler();
        b.iter(|| {
            let handle = scheduler
                .schedule_repeatedly(
                    black_box(Duration::from_secs(10)),
                    Duration::from_secs(1),
                    ActionJob::new(|| {}),
                )
                .expect("schedule");
            black_box(handle)
        });
        let _ = scheduler.stop();
    });

    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cancel", |b| {
        let scheduler = quiet_scheduler();
        b.iter_batched(
            || {
                scheduler
                    .schedule_once(Duration::from_secs(10), ActionJob::new(|| {}))
                    .expect("schedule")
            },
            |handle| handle.cancel().expect("cancel"),
            criterion::BatchSize::SmallInput,
        );
        let _ = scheduler.stop();
    });

    group.finish();
}

fn bench_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    group.throughput(Throughput::Elements(1));

    group.bench_function("placement", |b| {
        b.iter(|| placement(black_box(123_456), black_box(789), black_box(512)))
    });

    group.bench_function("delay_ticks", |b| {
        b.iter(|| {
            delay_ticks(
                black_box(Duration::from_millis(1500)),
                black_box(Duration::from_millis(10)),
            )
        })
    });

    group.finish();
}

fn bench_bulk_staging(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk");
    group.throughput(Throughput::Elements(10_000));
    group.sample_size(10);

    group.bench_function("schedule_10k", |b| {
        b.iter_batched(
            quiet_scheduler,
            |scheduler| {
                for _ in 0..10_000 {
                    let _ = scheduler
                        .schedule_once(Duration::from_secs(10), ActionJob::new(|| {}))
                        .expect("schedule");
                }
                let _ = scheduler.stop();
            },
            criterion::BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_schedule,
    bench_cancel,
    bench_placement,
    bench_bulk_staging
);
criterion_main!(benches);
