// Sequentially consistent max/min folding on shared accumulators, for
// reductions that publish extrema across workers.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

pub fn atomic_max_i64(x: &AtomicI64, value: i64) {
    x.fetch_max(value, Ordering::SeqCst);
}

pub fn atomic_min_i64(x: &AtomicI64, value: i64) {
    x.fetch_min(value, Ordering::SeqCst);
}

pub fn atomic_max_u64(x: &AtomicU64, value: u64) {
    x.fetch_max(value, Ordering::SeqCst);
}

pub fn atomic_min_u64(x: &AtomicU64, value: u64) {
    x.fetch_min(value, Ordering::SeqCst);
}
