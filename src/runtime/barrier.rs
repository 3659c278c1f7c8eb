// Reusable spin barriers for global rendezvous.
//
// The flat barrier is a single cache-padded countdown; the hierarchical
// barrier arranges flat barriers into an 8-ary tree so that the hot atomic is
// shared by at most eight threads at any level.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;

/// Flat rendezvous barrier.
///
/// Guarantees, per round: the last arriver runs the finalizer before anyone
/// is released; exactly one participant sees a `true` return (the leader);
/// the barrier can be waited on again immediately, a round counter keeps fast
/// re-entries from aliasing the previous round.
pub struct Barrier {
    thread_count: usize,
    cntr: CachePadded<AtomicUsize>,
    round: CachePadded<AtomicU8>,
}

impl Barrier {
    pub fn new(thread_count: usize) -> Self {
        assert!(thread_count > 0, "barrier needs at least one participant");
        Self {
            thread_count,
            cntr: CachePadded::new(AtomicUsize::new(thread_count)),
            round: CachePadded::new(AtomicU8::new(0)),
        }
    }

    /// Rendezvous; the leader's return value is the finalizer's.
    ///
    /// The round must be observed before the fetch_sub: a thread that
    /// decrements first could otherwise miss the release of the round it is
    /// about to spin on.
    pub fn wait_with<F: FnOnce() -> bool>(&self, finalizer: F) -> bool {
        let prev_round = self.round.load(Ordering::Acquire);
        let prev = self.cntr.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            // last thread arrived
            self.cntr.store(self.thread_count, Ordering::Relaxed);
            let r = finalizer();
            self.round.fetch_add(1, Ordering::Release);
            r
        } else {
            let mut spins = 0u32;
            while self.round.load(Ordering::Acquire) == prev_round {
                // busy-wait with a CPU hint; fall back to yielding when the
                // group is oversubscribed
                if spins < 4096 {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
            false
        }
    }

    /// Rendezvous, running `finalizer` once before release. Leader gets true.
    pub fn wait_fn<F: FnOnce()>(&self, finalizer: F) -> bool {
        self.wait_with(|| {
            finalizer();
            true
        })
    }

    /// Plain rendezvous. Leader gets true.
    pub fn wait(&self) -> bool {
        self.wait_with(|| true)
    }
}

/// Tree of flat barriers with fan-in 8. A leaf's last arriver waits on the
/// parent inside the leaf finalizer, so the release travels root-to-leaves
/// and a root-only finalizer runs exactly once across all threads.
pub struct HierarchicBarrier {
    parent: Option<Arc<HierarchicBarrier>>,
    barrier: Barrier,
}

impl HierarchicBarrier {
    pub const THREADS_PER_BARRIER: usize = 8;

    /// Build the tree bottom-up and return the leaf level; thread `tid`
    /// waits on `leaves[tid / THREADS_PER_BARRIER]`.
    pub fn create(nr_threads: usize) -> Vec<Arc<HierarchicBarrier>> {
        assert!(nr_threads > 0);
        if nr_threads <= Self::THREADS_PER_BARRIER {
            return vec![Arc::new(Self { parent: None, barrier: Barrier::new(nr_threads) })];
        }
        let nr_full = nr_threads / Self::THREADS_PER_BARRIER;
        let rest = nr_threads % Self::THREADS_PER_BARRIER;
        let nr_barriers = nr_full + usize::from(rest > 0);
        let parent_level = Self::create(nr_barriers);

        let mut leaves = Vec::with_capacity(nr_barriers);
        for i in 0..nr_full {
            leaves.push(Arc::new(Self {
                parent: Some(parent_level[i / Self::THREADS_PER_BARRIER].clone()),
                barrier: Barrier::new(Self::THREADS_PER_BARRIER),
            }));
        }
        if rest > 0 {
            // the partial barrier joins the last parent, whose participant
            // count already accounts for it
            leaves.push(Arc::new(Self {
                parent: Some(parent_level.last().expect("non-empty level").clone()),
                barrier: Barrier::new(rest),
            }));
        }
        leaves
    }

    /// Rendezvous across the whole tree; `finalizer` runs once at the root.
    /// The root leader gets true.
    pub fn wait_fn<F: FnOnce()>(&self, finalizer: F) -> bool {
        match &self.parent {
            Some(p) => self.barrier.wait_with(|| p.wait_fn(finalizer)),
            None => self.barrier.wait_with(|| {
                finalizer();
                true
            }),
        }
    }

    pub fn wait(&self) -> bool {
        self.wait_fn(|| {})
    }
}
