// Rendezvous cost of the flat barrier against the 8-ary hierarchical one.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use rusty_olap::runtime::{Barrier, HierarchicBarrier};

const ROUNDS: usize = 200;

fn bench_barriers(c: &mut Criterion) {
    let mut group = c.benchmark_group("barrier_rounds");
    group.sample_size(10);
    for &threads in &[4usize, 16] {
        group.bench_function(BenchmarkId::new("flat", threads), |b| {
            b.iter(|| {
                let barrier = Barrier::new(threads);
                std::thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..ROUNDS {
                                barrier.wait();
                            }
                        });
                    }
                });
            })
        });
        group.bench_function(BenchmarkId::new("hierarchic", threads), |b| {
            b.iter(|| {
                let leaves = HierarchicBarrier::create(threads);
                std::thread::scope(|s| {
                    for tid in 0..threads {
                        let leaf = leaves[tid / HierarchicBarrier::THREADS_PER_BARRIER].clone();
                        s.spawn(move || {
                            for _ in 0..ROUNDS {
                                leaf.wait();
                            }
                        });
                    }
                });
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_barriers);
criterion_main!(benches);
