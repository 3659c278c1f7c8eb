// Primitive kernel throughput: scalar vs dispatched (AVX2 where available).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rusty_olap::vectorized::{EngineConfig, Pos};

fn bench_sel_less(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let col: Vec<i32> = (0..1 << 20).map(|_| rng.random()).collect();
    let pivot = 0i32;
    let mut sel = vec![0 as Pos; col.len()];

    let mut group = c.benchmark_group("sel_less_i32");
    for (name, conf) in [
        ("scalar", EngineConfig::scalar_only(1024)),
        ("dispatched", EngineConfig { vector_size: 1024, ..Default::default() }),
    ] {
        let f = conf.sel_less_i32_col_val();
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| unsafe {
                black_box(f(
                    col.len(),
                    sel.as_mut_ptr() as *mut _,
                    col.as_ptr() as *mut _,
                    &pivot as *const i32 as *mut _,
                ))
            })
        });
    }
    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let col: Vec<i64> = (0..1 << 20).map(|_| rng.random()).collect();
    let mut out = vec![0u64; col.len()];

    let mut group = c.benchmark_group("hash_i64");
    for (name, conf) in [
        ("scalar", EngineConfig::scalar_only(1024)),
        ("dispatched", EngineConfig { vector_size: 1024, ..Default::default() }),
    ] {
        let f = conf.hash_i64_col();
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| unsafe {
                black_box(f(col.len(), out.as_mut_ptr() as *mut _, col.as_ptr() as *mut _))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sel_less, bench_hash);
criterion_main!(benches);
