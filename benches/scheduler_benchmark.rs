//! Scheduler benchmark suite for cotick.
//!
//! Benchmarks the cost of the scheduling primitives under load:
//! - Spawn/cancel churn across a large population of roots
//! - Frame-drain throughput with thousands of queued waiters
//! - Recursive child-await chains (Fibonacci) with half the roots cancelled

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::future::Future;
use std::hint::black_box;
use std::pin::Pin;

use cotick::{wait, Scheduler};

/// Recursive Fibonacci through child awaits; leaves yield once.
fn fib(n: u32) -> Pin<Box<dyn Future<Output = u64>>> {
    Box::pin(async move {
        if n < 2 {
            wait(0.0).await;
            u64::from(n)
        } else {
            fib(n - 1).await + fib(n - 2).await
        }
    })
}

fn bench_spawn_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_cancel");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("spawn_10k_cancel_half", |b| {
        b.iter_batched(
            Scheduler::new,
            |sched| {
                let mut handles = Vec::with_capacity(10_000);
                for _ in 0..10_000 {
                    handles.push(sched.start(|| async {
                        loop {
                            wait(0.0).await;
                        }
                    }));
                }
                for handle in handles.iter().step_by(2) {
                    handle.stop();
                }
                black_box(&handles);
                drop(handles);
                sched
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_frame_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_drain");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("update_10k_yielding_roots", |b| {
        b.iter_batched(
            || {
                let sched = Scheduler::new();
                let mut handles = Vec::with_capacity(10_000);
                for _ in 0..10_000 {
                    handles.push(sched.start(|| async {
                        loop {
                            wait(0.0).await;
                        }
                    }));
                }
                (sched, handles)
            },
            |(sched, handles)| {
                sched.update();
                black_box(&handles);
                (sched, handles)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_fib_stress(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_stress");
    group.sample_size(10);
    group.bench_function("fib10_10k_roots_half_cancelled", |b| {
        b.iter_batched(
            || {
                let sched = Scheduler::new();
                let mut handles = Vec::with_capacity(10_000);
                for _ in 0..10_000 {
                    handles.push(sched.start(|| async { fib(10).await }));
                }
                for handle in handles.iter().step_by(2) {
                    handle.stop();
                }
                (sched, handles)
            },
            |(sched, handles)| {
                while handles.iter().any(|h| !h.is_down()) {
                    sched.update();
                }
                for (index, handle) in handles.iter().enumerate() {
                    if index % 2 != 0 {
                        assert_eq!(handle.take_result(), Some(55));
                    }
                }
                (sched, handles)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_spawn_cancel, bench_frame_drain, bench_fib_stress);
criterion_main!(benches);
