// Grouped aggregation.
//
// Each worker folds its batches into a thread-local grouping table (packed
// fixed-width key, i64 accumulators). At child EOS the tables are registered
// and the barrier leader sizes a shared atomic-chained directory; every
// worker then merges the hash range it owns from all thread-local tables and
// emits its merged groups in batches. Bucket ownership is disjoint, so
// same-key merges never race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DbError, Result};
use crate::runtime::{barrier_fn, this_worker};
use crate::types::{hash_bits, rehash_bits};
use crate::vectorized::expression::{Access, BufPtr};
use crate::vectorized::operators::Operator;
use crate::vectorized::Pos;

/// Packed group keys are at most this many bytes.
pub const MAX_KEY_BYTES: usize = 16;

/// At most this many accumulators per group.
pub const MAX_AGGRS: usize = 8;

const NO_ENTRY: u32 = u32::MAX;

/// One aggregate accumulator specification.
pub enum Aggr {
    /// Sum of a 64-bit column.
    SumI64(Access),
    /// Row count.
    CountStar,
}

#[derive(Clone, Copy)]
struct GroupEntry {
    hash: u64,
    next: u32,
    key: [u8; MAX_KEY_BYTES],
    aggs: [i64; MAX_AGGRS],
}

/// Thread-local chained grouping table.
struct LocalTable {
    heads: Vec<u32>,
    mask: usize,
    entries: Vec<GroupEntry>,
}

impl LocalTable {
    fn new() -> Self {
        let cap = 1024;
        Self { heads: vec![NO_ENTRY; cap], mask: cap - 1, entries: Vec::new() }
    }

    fn grow(&mut self) {
        let cap = self.heads.len() * 2;
        self.heads = vec![NO_ENTRY; cap];
        self.mask = cap - 1;
        for (idx, e) in self.entries.iter_mut().enumerate() {
            let b = (e.hash as usize) & self.mask;
            e.next = self.heads[b];
            self.heads[b] = idx as u32;
        }
    }

    /// Find or create the group for `key`, returning its accumulator slots.
    fn upsert(&mut self, hash: u64, key: &[u8; MAX_KEY_BYTES]) -> &mut [i64; MAX_AGGRS] {
        let b = (hash as usize) & self.mask;
        let mut idx = self.heads[b];
        while idx != NO_ENTRY {
            let e = &self.entries[idx as usize];
            if e.hash == hash && &e.key == key {
                return &mut self.entries[idx as usize].aggs;
            }
            idx = e.next;
        }
        if self.entries.len() >= self.heads.len() / 2 {
            self.grow();
        }
        let b = (hash as usize) & self.mask;
        let entry = GroupEntry {
            hash,
            next: self.heads[b],
            key: *key,
            aggs: [0; MAX_AGGRS],
        };
        self.heads[b] = self.entries.len() as u32;
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        &mut self.entries[last].aggs
    }
}

/// Shared bucket directory for the merge phase. Heads chain into the owning
/// worker's merged entry vector; every bucket belongs to exactly one worker.
struct SharedDirectory {
    heads: Vec<AtomicU64>,
    mask: u64,
}

#[derive(Default)]
pub struct GroupShared {
    locals: Mutex<Vec<Arc<LocalTable>>>,
    directory: Mutex<Option<std::result::Result<Arc<SharedDirectory>, DbError>>>,
}

#[derive(PartialEq)]
enum GroupState {
    Initial,
    Emitting,
    Done,
}

pub struct HashGroup {
    child: Box<dyn Operator>,
    keys: Vec<Access>,
    sel: Option<BufPtr>,
    aggrs: Vec<Aggr>,
    /// One output buffer per key part; elements are the raw key-part bytes.
    out_keys: Vec<BufPtr>,
    /// One i64 output buffer per aggregate.
    out_aggrs: Vec<BufPtr>,
    vector_size: usize,
    shared: Arc<GroupShared>,

    key_size: usize,
    state: GroupState,
    local: LocalTable,
    merged: Vec<GroupEntry>,
    emit_pos: usize,
}

impl HashGroup {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn Operator>,
        keys: Vec<Access>,
        sel: Option<BufPtr>,
        aggrs: Vec<Aggr>,
        out_keys: Vec<BufPtr>,
        out_aggrs: Vec<BufPtr>,
        vector_size: usize,
        shared: Arc<GroupShared>,
    ) -> Self {
        let key_size: usize = keys.iter().map(Access::size).sum();
        assert!(key_size <= MAX_KEY_BYTES, "group key exceeds {MAX_KEY_BYTES} bytes");
        assert!(aggrs.len() <= MAX_AGGRS);
        assert_eq!(keys.len(), out_keys.len());
        assert_eq!(aggrs.len(), out_aggrs.len());
        Self {
            child,
            keys,
            sel,
            aggrs,
            out_keys,
            out_aggrs,
            vector_size,
            shared,
            key_size,
            state: GroupState::Initial,
            local: LocalTable::new(),
            merged: Vec::new(),
            emit_pos: 0,
        }
    }

    #[inline]
    fn pack_key(&self, logical: usize, phys: usize) -> [u8; MAX_KEY_BYTES] {
        let mut key = [0u8; MAX_KEY_BYTES];
        let mut at = 0;
        for a in &self.keys {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    a.value_ptr(logical, phys),
                    key.as_mut_ptr().add(at),
                    a.size(),
                );
            }
            at += a.size();
        }
        key
    }

    #[inline]
    fn key_hash(key: &[u8; MAX_KEY_BYTES], key_size: usize) -> u64 {
        let w0 = u64::from_le_bytes(key[..8].try_into().expect("8 bytes"));
        let h = hash_bits(w0);
        if key_size > 8 {
            let w1 = u64::from_le_bytes(key[8..16].try_into().expect("8 bytes"));
            rehash_bits(h, w1)
        } else {
            h
        }
    }

    fn accumulate_phase(&mut self) -> Result<()> {
        loop {
            let n = self.child.next()?;
            if n == 0 {
                break;
            }
            for i in 0..n {
                let phys = match self.sel {
                    Some(s) => unsafe { s.read::<Pos>(i) as usize },
                    None => i,
                };
                let key = self.pack_key(i, phys);
                let hash = Self::key_hash(&key, self.key_size);
                let aggs = self.local.upsert(hash, &key);
                for (j, a) in self.aggrs.iter().enumerate() {
                    match a {
                        Aggr::SumI64(src) => {
                            let v = unsafe {
                                (src.value_ptr(i, phys) as *const i64).read_unaligned()
                            };
                            aggs[j] = aggs[j].wrapping_add(v);
                        }
                        Aggr::CountStar => aggs[j] += 1,
                    }
                }
            }
        }

        // register the local table and let the leader size the directory
        let local = Arc::new(std::mem::replace(&mut self.local, LocalTable::new()));
        self.shared.locals.lock().push(local);
        let shared = self.shared.clone();
        barrier_fn(move || {
            let total: usize = shared.locals.lock().iter().map(|t| t.entries.len()).sum();
            let capacity = total.checked_mul(2).map(|c| c.max(1024).next_power_of_two());
            let dir = match capacity {
                Some(cap) => {
                    let mut heads = Vec::new();
                    match heads.try_reserve_exact(cap) {
                        Ok(()) => {
                            heads.resize_with(cap, || AtomicU64::new(NO_ENTRY as u64));
                            Ok(Arc::new(SharedDirectory { heads, mask: cap as u64 - 1 }))
                        }
                        Err(_) => Err(DbError::Resource(format!(
                            "group directory of {cap} buckets"
                        ))),
                    }
                }
                None => Err(DbError::Resource("group directory overflow".into())),
            };
            *shared.directory.lock() = Some(dir);
        });
        let dir = self
            .shared
            .directory
            .lock()
            .clone()
            .expect("group barrier published the directory")?;

        // merge the owned bucket range from every local table
        let ctx = this_worker();
        let nr = ctx.nr_workers;
        let tid = ctx.id;
        let cap = dir.heads.len();
        let lo = tid * cap / nr;
        let hi = (tid + 1) * cap / nr;
        let locals = self.shared.locals.lock().clone();
        for lt in &locals {
            for e in &lt.entries {
                let b = (e.hash & dir.mask) as usize;
                if b < lo || b >= hi {
                    continue;
                }
                let mut idx = dir.heads[b].load(Ordering::Relaxed) as u32;
                let mut found = false;
                while idx != NO_ENTRY {
                    let m = &mut self.merged[idx as usize];
                    if m.hash == e.hash && m.key == e.key {
                        for j in 0..MAX_AGGRS {
                            m.aggs[j] = m.aggs[j].wrapping_add(e.aggs[j]);
                        }
                        found = true;
                        break;
                    }
                    idx = m.next;
                }
                if !found {
                    let mut fresh = *e;
                    fresh.next = dir.heads[b].load(Ordering::Relaxed) as u32;
                    self.merged.push(fresh);
                    dir.heads[b].store(self.merged.len() as u64 - 1, Ordering::Release);
                }
            }
        }

        self.state = GroupState::Emitting;
        self.emit_pos = 0;
        Ok(())
    }

    fn emit(&mut self) -> usize {
        let remaining = self.merged.len() - self.emit_pos;
        let n = remaining.min(self.vector_size);
        for i in 0..n {
            let e = &self.merged[self.emit_pos + i];
            let mut at = 0;
            for (j, a) in self.keys.iter().enumerate() {
                let size = a.size();
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        e.key.as_ptr().add(at),
                        self.out_keys[j].as_ptr::<u8>().add(i * size),
                        size,
                    );
                }
                at += size;
            }
            for j in 0..self.aggrs.len() {
                unsafe {
                    self.out_aggrs[j].as_ptr::<i64>().add(i).write(e.aggs[j]);
                }
            }
        }
        self.emit_pos += n;
        if n == 0 {
            self.state = GroupState::Done;
        }
        n
    }
}

impl Operator for HashGroup {
    fn next(&mut self) -> Result<usize> {
        match self.state {
            GroupState::Initial => {
                self.accumulate_phase()?;
                Ok(self.emit())
            }
            GroupState::Emitting => Ok(self.emit()),
            GroupState::Done => Ok(0),
        }
    }
}
