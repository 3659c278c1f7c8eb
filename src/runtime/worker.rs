// Worker group and per-thread execution context.
//
// A WorkerGroup spawns n OS threads that each run the same query closure.
// Every thread carries a `this_worker` context with its id, its vector
// allocator and its leaf of the group's hierarchical barrier. Outside a
// group (unit tests, single-threaded tools) the context lazily defaults to a
// solo worker.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Result;
use crate::runtime::alloc::{GlobalPool, VectorAllocator};
use crate::runtime::barrier::HierarchicBarrier;

pub struct WorkerContext {
    pub id: usize,
    pub nr_workers: usize,
    pub allocator: RefCell<VectorAllocator>,
    pub barrier: Arc<HierarchicBarrier>,
}

thread_local! {
    static THIS_WORKER: RefCell<Option<Rc<WorkerContext>>> = const { RefCell::new(None) };
}

/// The calling thread's worker context.
pub fn this_worker() -> Rc<WorkerContext> {
    THIS_WORKER.with(|w| {
        let mut w = w.borrow_mut();
        w.get_or_insert_with(|| {
            // solo context for threads outside a worker group; it gets its
            // own private pool so allocation works without a scope
            let mut allocator = VectorAllocator::new();
            allocator.set_source(Some(Arc::new(GlobalPool::new())));
            Rc::new(WorkerContext {
                id: 0,
                nr_workers: 1,
                allocator: RefCell::new(allocator),
                barrier: HierarchicBarrier::create(1).remove(0),
            })
        })
        .clone()
    })
}

fn install_worker(ctx: Rc<WorkerContext>) {
    THIS_WORKER.with(|w| *w.borrow_mut() = Some(ctx));
}

fn clear_worker() {
    THIS_WORKER.with(|w| *w.borrow_mut() = None);
}

/// Rendezvous with the other workers of this thread's group.
pub fn barrier() -> bool {
    let ctx = this_worker();
    let b = ctx.barrier.clone();
    b.wait()
}

/// Rendezvous, running `f` exactly once across the group before release.
pub fn barrier_fn<F: FnOnce()>(f: F) -> bool {
    let ctx = this_worker();
    let b = ctx.barrier.clone();
    b.wait_fn(f)
}

/// Run `f` with the thread's allocator sourced from `pool`; the previous
/// source is restored and the allocator reset on every exit path.
pub fn with_source<R>(pool: &Arc<GlobalPool>, f: impl FnOnce() -> R) -> R {
    struct Restore {
        previous: Option<Arc<GlobalPool>>,
    }
    impl Drop for Restore {
        fn drop(&mut self) {
            let ctx = this_worker();
            let mut alloc = ctx.allocator.borrow_mut();
            alloc.reset();
            alloc.set_source(self.previous.take());
        }
    }

    let ctx = this_worker();
    let previous = ctx.allocator.borrow_mut().set_source(Some(pool.clone()));
    drop(ctx);
    let _restore = Restore { previous };
    f()
}

/// Static morsel assignment: the half-open row range of worker `tid`.
pub fn morsel_range(tid: usize, nr_workers: usize, total: usize) -> (usize, usize) {
    let begin = tid * total / nr_workers;
    let end = (tid + 1) * total / nr_workers;
    (begin, end)
}

/// Fixed group of worker threads executing one closure per query.
pub struct WorkerGroup {
    nr_threads: usize,
}

impl WorkerGroup {
    pub fn new(nr_threads: usize) -> Self {
        assert!(nr_threads > 0, "worker group needs at least one thread");
        Self { nr_threads }
    }

    pub fn nr_threads(&self) -> usize {
        self.nr_threads
    }

    /// Execute `f` on every worker. The first worker error is returned after
    /// all workers finished; a worker panic propagates.
    pub fn run<F>(&self, f: F) -> Result<()>
    where
        F: Fn() -> Result<()> + Sync,
    {
        let leaves = HierarchicBarrier::create(self.nr_threads);
        let results = std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.nr_threads);
            for tid in 0..self.nr_threads {
                let leaf = leaves[tid / HierarchicBarrier::THREADS_PER_BARRIER].clone();
                let nr_workers = self.nr_threads;
                let f = &f;
                handles.push(s.spawn(move || {
                    install_worker(Rc::new(WorkerContext {
                        id: tid,
                        nr_workers,
                        allocator: RefCell::new(VectorAllocator::new()),
                        barrier: leaf,
                    }));
                    let r = f();
                    clear_worker();
                    r
                }));
            }
            handles
                .into_iter()
                .map(|h| h.join().expect("worker panicked"))
                .collect::<Vec<_>>()
        });
        results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn workers_get_distinct_ids_and_one_leader() {
        let group = WorkerGroup::new(4);
        let ids = AtomicUsize::new(0);
        let leaders = AtomicUsize::new(0);
        group
            .run(|| {
                let ctx = this_worker();
                assert_eq!(ctx.nr_workers, 4);
                ids.fetch_add(1 << (8 * ctx.id), Ordering::SeqCst);
                if barrier() {
                    leaders.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(ids.load(Ordering::SeqCst), 0x01010101);
        assert_eq!(leaders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_worker_error_is_surfaced() {
        let group = WorkerGroup::new(3);
        let err = group
            .run(|| {
                if this_worker().id == 1 {
                    Err(DbError::Execution("boom".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, DbError::Execution(_)));
    }

    #[test]
    fn with_source_restores_and_resets() {
        let pool = Arc::new(GlobalPool::new());
        let group = WorkerGroup::new(2);
        group
            .run(|| {
                with_source(&pool, || {
                    let ctx = this_worker();
                    let p = ctx.allocator.borrow_mut().alloc(64).unwrap();
                    assert!(!p.as_ptr().is_null());
                });
                // source restored to none
                let ctx = this_worker();
                assert!(!ctx.allocator.borrow().has_source());
                Ok(())
            })
            .unwrap();
        assert_eq!(pool.free_chunks(), 2);
    }

    #[test]
    fn morsel_ranges_cover_without_overlap() {
        let total = 10_007;
        let workers = 7;
        let mut covered = 0;
        for tid in 0..workers {
            let (b, e) = morsel_range(tid, workers, total);
            assert!(b <= e);
            covered += e - b;
            if tid > 0 {
                assert_eq!(morsel_range(tid - 1, workers, total).1, b);
            }
        }
        assert_eq!(covered, total);
    }
}
