use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use khora_data::sync::WorkQueue;
use std::collections::VecDeque;
use std::hint::black_box;
use std::sync::{Arc, Mutex};
use std::thread;

const ITEMS: usize = 10_000;

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("Work Queue (single thread)");

    group.bench_function("WorkQueue push then drain", |b| {
        let queue = WorkQueue::new();
        b.iter(|| {
            for i in 0..ITEMS {
                queue.push(i);
            }
            let mut sum = 0;
            while let Some(i) = queue.pop() {
                sum += i;
            }
            black_box(sum);
        });
    });

    // Baseline: what a locked deque costs without contention.
    group.bench_function("Mutex<VecDeque> push then drain", |b| {
        let queue = Mutex::new(VecDeque::new());
        b.iter(|| {
            for i in 0..ITEMS {
                queue.lock().unwrap().push_back(i);
            }
            let mut sum = 0;
            while let Some(i) = queue.lock().unwrap().pop_front() {
                sum += i;
            }
            black_box(sum);
        });
    });

    group.finish();
}

// Draining should scale linearly with the backlog.
fn bench_backlog(c: &mut Criterion) {
    let mut group = c.benchmark_group("Work Queue (backlog drain)");
    group.sample_size(20);

    for backlog in [10_000usize, 40_000, 160_000] {
        group.bench_with_input(BenchmarkId::from_parameter(backlog), &backlog, |b, &n| {
            let queue = WorkQueue::new();
            b.iter(|| {
                for i in 0..n {
                    queue.push(i);
                }
                let mut drained = 0;
                while queue.pop().is_some() {
                    drained += 1;
                }
                black_box(drained);
            });
        });
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("Work Queue (4 producers, 4 consumers)");
    group.sample_size(20);

    group.bench_function("WorkQueue", |b| {
        b.iter(|| {
            let queue = Arc::new(WorkQueue::new());
            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = queue.clone();
                    thread::spawn(move || {
                        for i in 0..ITEMS / 4 {
                            queue.push(i);
                        }
                    })
                })
                .collect();
            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = queue.clone();
                    thread::spawn(move || {
                        let mut taken = 0;
                        while taken < ITEMS / 4 {
                            match queue.pop() {
                                Some(_) => taken += 1,
                                None => thread::yield_now(),
                            }
                        }
                    })
                })
                .collect();
            for handle in producers.into_iter().chain(consumers) {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_backlog, bench_contended);
criterion_main!(benches);
