use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use podsim::{AddrPool, ConcurrentSet, Dispatcher, Funcs, Renderer, SharedCache};
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::scope,
    time::Instant,
};

// Number of operations per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_OPS: usize = 4096;

/// Acquire then release on a single thread: the recycle path.
fn bench_pool_recycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("addr_pool/recycle");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
        let pool = AddrPool::from_cidr("10.0.0.0/16").unwrap();
        b.iter(|| {
            for _ in 0..TOTAL_OPS {
                let addr = pool.acquire().unwrap();
                pool.release(black_box(addr));
            }
        });
    });

    group.finish();
}

/// Fresh sequential allocation from an empty pool.
fn bench_pool_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("addr_pool/generate");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let pool = AddrPool::from_cidr("10.0.0.0/8").unwrap();
                for _ in 0..TOTAL_OPS {
                    black_box(pool.acquire().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Contended acquire/release across threads.
fn bench_pool_contended(c: &mut Criterion) {
    for threads in [2, 4, 8] {
        let mut group = c.benchmark_group(format!("addr_pool/contended/threads/{threads}"));
        group.throughput(Throughput::Elements((TOTAL_OPS * threads) as u64));

        group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
            let pool = AddrPool::from_cidr("10.0.0.0/16").unwrap();
            b.iter(|| {
                scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..TOTAL_OPS {
                                let addr = pool.acquire().unwrap();
                                pool.release(black_box(addr));
                            }
                        });
                    }
                });
            });
        });

        group.finish();
    }
}

/// Submit-and-drain of trivial tasks, exercising hand-off and spawn.
fn bench_dispatcher(c: &mut Criterion) {
    for capacity in [1, 4, num_cpus::get()] {
        let mut group = c.benchmark_group(format!("dispatcher/capacity/{capacity}"));
        group.throughput(Throughput::Elements(TOTAL_OPS as u64));

        group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
            let dispatcher = Dispatcher::new(capacity);
            let counter = Arc::new(AtomicUsize::new(0));
            b.iter(|| {
                for _ in 0..TOTAL_OPS {
                    let counter = Arc::clone(&counter);
                    dispatcher
                        .submit(move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                }
                dispatcher.wait();
            });
        });

        group.finish();
    }
}

/// Rendering with a warm template cache and buffer pool.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("renderer");
    group.throughput(Throughput::Elements(1));

    let renderer = Renderer::new();
    let funcs = Funcs::new();
    let template = "status:\n  podIP: {{ .ip }}\n  phase: {{ .phase }}\n  restartCount: {{ .restarts }}";
    let state = json!({"ip": "10.0.3.7", "phase": "Running", "restarts": 3});

    group.bench_function("status_patch", |b| {
        b.iter(|| black_box(renderer.render(template, &state, &funcs).unwrap()));
    });

    group.bench_function("status_patch/cold_cache", |b| {
        b.iter(|| {
            renderer.clear_cache();
            black_box(renderer.render(template, &state, &funcs).unwrap())
        });
    });

    group.finish();
}

fn bench_containers(c: &mut Criterion) {
    let mut group = c.benchmark_group("containers");
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function("set/put_has_delete", |b| {
        let set = ConcurrentSet::new();
        b.iter(|| {
            for i in 0..TOTAL_OPS {
                set.put(i);
                black_box(set.has(&i));
                set.delete(&i);
            }
        });
    });

    group.bench_function("cache/set_get_unset", |b| {
        let cache: SharedCache<usize, usize> = SharedCache::new();
        b.iter(|| {
            for i in 0..TOTAL_OPS {
                cache.set(i, i);
                black_box(cache.get(&i));
                cache.unset(&i);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pool_recycle,
    bench_pool_generate,
    bench_pool_contended,
    bench_dispatcher,
    bench_render,
    bench_containers,
);
criterion_main!(benches);
