use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use loadwise::{Dispatcher, DispatcherConfig, Job, JobRequest, LoadHeap, WorkerId};
use std::time::{Duration, Instant};
use tokio::{runtime::Builder, sync::mpsc};

// Jobs pushed through the pool per benchmark iteration.
const JOBS: usize = 4096;

/// Benchmarks the heap operations the decision loop performs per arrival and
/// per completion, on a pool where every worker carries some load.
fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap");
    group.throughput(Throughput::Elements(JOBS as u64));

    for pool_size in [4, 64, 1024] {
        group.bench_function(format!("dispatch_complete/workers/{pool_size}"), |b| {
            b.iter_custom(|iters| {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    let mut heap = LoadHeap::new(pool_size);
                    let mut assigned: Vec<WorkerId> = Vec::with_capacity(JOBS);
                    let start = Instant::now();
                    for _ in 0..JOBS {
                        let Some(worker) = heap.pop_min() else {
                            unreachable!()
                        };
                        heap.set_load(worker, heap.load(worker) + 1);
                        heap.push(worker);
                        assigned.push(worker);
                    }
                    for worker in assigned.drain(..) {
                        let Some(index) = heap.position(worker) else {
                            unreachable!()
                        };
                        heap.remove_at(index);
                        heap.set_load(worker, heap.load(worker) - 1);
                        heap.push(worker);
                    }
                    total += start.elapsed();
                    black_box(&heap);
                }
                total
            });
        });
    }
    group.finish();
}

/// Benchmarks end-to-end throughput of trivial jobs through a running pool.
fn bench_dispatcher(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let mut group = c.benchmark_group("dispatcher");
    group.throughput(Throughput::Elements(JOBS as u64));

    for pool_size in [1, 4, num_cpus::get()] {
        let dispatcher = {
            let _guard = rt.enter();
            Dispatcher::<usize>::spawn(DispatcherConfig::with_pool_size(pool_size)).unwrap()
        };

        group.bench_function(format!("submit/workers/{pool_size}"), |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let dispatcher = &dispatcher;
                async move {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let (tx, mut results) = mpsc::channel(JOBS);
                        for i in 0..JOBS {
                            let job = Job::from_fn(move || black_box(i));
                            dispatcher
                                .submit(JobRequest::new(job, tx.clone()))
                                .await
                                .unwrap();
                        }
                        drop(tx);
                        while let Some(outcome) = results.recv().await {
                            black_box(outcome.unwrap());
                        }
                    }
                    start.elapsed()
                }
            });
        });

        rt.block_on(dispatcher.shutdown()).unwrap();
    }
    group.finish();
}

criterion_group!(benches, bench_heap, bench_dispatcher);
criterion_main!(benches);
