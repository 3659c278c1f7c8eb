// Parallel runtime: rendezvous barriers, the worker group that drives query
// pipelines, per-thread vector allocation, and per-query shared state.

pub mod alloc;
pub mod atomics;
pub mod barrier;
pub mod shared;
pub mod worker;

pub use alloc::{GlobalPool, VectorAllocator};
pub use atomics::{atomic_max_i64, atomic_max_u64, atomic_min_i64, atomic_min_u64};
pub use barrier::{Barrier, HierarchicBarrier};
pub use shared::SharedStateManager;
pub use worker::{barrier, barrier_fn, morsel_range, this_worker, with_source, WorkerGroup};
