// Chained hash table for the parallel hash join.
//
// The table is a power-of-two directory of bucket heads over a flat entry
// arena. Heads and intra-bucket links are byte offsets into the arena;
// `EMPTY` terminates a chain. Entries are fixed width:
//
//   [ next: u64 | hash: u64 | key bytes | payload bytes ]
//
// The arena is sized exactly once by the build leader; workers then write
// disjoint slot ranges and publish each entry with a CAS on its bucket head,
// so duplicates chain in unspecified order. After the probe barrier the
// table is read-only.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DbError, Result};

/// Chain terminator.
pub const EMPTY: u64 = u64::MAX;

/// Byte offset of the stored hash inside an entry.
pub const HASH_OFFSET: usize = 8;

/// Byte offset of the key bytes inside an entry.
pub const KEY_OFFSET: usize = 16;

pub struct JoinTable {
    heads: Vec<AtomicU64>,
    mask: u64,
    arena: UnsafeCell<Vec<u8>>,
    entry_size: usize,
    key_size: usize,
    entry_count: usize,
}

// Heads are atomics; arena writes during the scatter phase target disjoint
// slot ranges per worker and are ordered by the probe barrier.
unsafe impl Send for JoinTable {}
unsafe impl Sync for JoinTable {}

/// Entry stride for the given key and payload widths, 8-byte aligned.
pub fn entry_size_for(key_size: usize, payload_size: usize) -> usize {
    (KEY_OFFSET + key_size + payload_size + 7) & !7
}

impl JoinTable {
    /// Allocate a table for `entry_count` entries: directory capacity is the
    /// next power of two of `max(1024, 2 * entry_count)`, which keeps the
    /// load factor at or below one half and bucket selection to a mask.
    pub fn with_capacity(entry_count: usize, key_size: usize, payload_size: usize) -> Result<Self> {
        let capacity = entry_count
            .checked_mul(2)
            .map(|c| c.max(1024).next_power_of_two())
            .ok_or_else(|| DbError::Resource("hash table capacity overflow".into()))?;
        let entry_size = entry_size_for(key_size, payload_size);
        let bytes = entry_count
            .checked_mul(entry_size)
            .ok_or_else(|| DbError::Resource("hash table arena overflow".into()))?;

        let mut heads = Vec::new();
        heads.try_reserve_exact(capacity).map_err(|_| {
            DbError::Resource(format!("hash table directory of {capacity} buckets"))
        })?;
        heads.resize_with(capacity, || AtomicU64::new(EMPTY));

        let mut arena = Vec::new();
        arena
            .try_reserve_exact(bytes)
            .map_err(|_| DbError::Resource(format!("hash table arena of {bytes} bytes")))?;
        arena.resize(bytes, 0);

        Ok(Self {
            heads,
            mask: capacity as u64 - 1,
            arena: UnsafeCell::new(arena),
            entry_size,
            key_size,
            entry_count,
        })
    }

    pub fn capacity(&self) -> usize {
        self.heads.len()
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn payload_offset(&self) -> usize {
        KEY_OFFSET + self.key_size
    }

    pub fn arena_ptr(&self) -> *const u8 {
        unsafe { (*self.arena.get()).as_ptr() }
    }

    pub fn heads_ptr(&self) -> *const u64 {
        self.heads.as_ptr() as *const u64
    }

    #[inline]
    pub fn bucket_head(&self, hash: u64) -> u64 {
        self.heads[(hash & self.mask) as usize].load(Ordering::Acquire)
    }

    /// Writable pointer to slot `slot` of the arena.
    ///
    /// # Safety
    /// `slot < entry_count` and no two threads may target the same slot.
    pub unsafe fn slot_ptr(&self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.entry_count);
        (*self.arena.get()).as_mut_ptr().add(slot * self.entry_size)
    }

    /// Serialize one entry into `slot` without linking it.
    ///
    /// # Safety
    /// Same as `slot_ptr`; key and payload must fit the configured widths.
    pub unsafe fn write_entry(&self, slot: usize, hash: u64, key: &[u8], payload: &[u8]) {
        debug_assert!(key.len() == self.key_size);
        debug_assert!(KEY_OFFSET + key.len() + payload.len() <= self.entry_size);
        let p = self.slot_ptr(slot);
        (p as *mut u64).write(EMPTY);
        (p.add(HASH_OFFSET) as *mut u64).write(hash);
        std::ptr::copy_nonoverlapping(key.as_ptr(), p.add(KEY_OFFSET), key.len());
        std::ptr::copy_nonoverlapping(
            payload.as_ptr(),
            p.add(KEY_OFFSET + key.len()),
            payload.len(),
        );
    }

    /// Publish slot `slot`: insert it at its bucket head. Safe to call from
    /// many threads for distinct slots.
    ///
    /// # Safety
    /// The slot must have been fully written by the calling thread.
    pub unsafe fn link(&self, slot: usize) {
        let off = (slot * self.entry_size) as u64;
        let p = self.slot_ptr(slot);
        let hash = (p.add(HASH_OFFSET) as *const u64).read();
        let head = &self.heads[(hash & self.mask) as usize];
        let mut cur = head.load(Ordering::Relaxed);
        loop {
            (p as *mut u64).write(cur);
            match head.compare_exchange_weak(cur, off, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => cur = seen,
            }
        }
    }

    /// # Safety
    /// `off` must be a valid entry offset.
    #[inline]
    pub unsafe fn next(&self, off: u64) -> u64 {
        (self.arena_ptr().add(off as usize) as *const u64).read()
    }

    /// # Safety
    /// `off` must be a valid entry offset.
    #[inline]
    pub unsafe fn hash_at(&self, off: u64) -> u64 {
        (self.arena_ptr().add(off as usize + HASH_OFFSET) as *const u64).read()
    }

    /// # Safety
    /// `off` must be a valid entry offset.
    #[inline]
    pub unsafe fn key_ptr(&self, off: u64) -> *const u8 {
        self.arena_ptr().add(off as usize + KEY_OFFSET)
    }

    /// # Safety
    /// `off` must be a valid entry offset.
    #[inline]
    pub unsafe fn payload_ptr(&self, off: u64) -> *const u8 {
        self.arena_ptr().add(off as usize + self.payload_offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{hash_bits, Scalar};

    #[test]
    fn capacity_keeps_load_factor_under_half() {
        let t = JoinTable::with_capacity(3000, 4, 8).unwrap();
        assert!(t.capacity() >= 2 * 3000);
        assert!(t.capacity().is_power_of_two());
        let t = JoinTable::with_capacity(0, 4, 0).unwrap();
        assert_eq!(t.capacity(), 1024);
    }

    #[test]
    fn build_and_walk_chains() {
        let t = JoinTable::with_capacity(3, 4, 8).unwrap();
        let rows: [(i32, i64); 3] = [(1, 10), (2, 20), (2, 21)];
        for (slot, (k, v)) in rows.iter().enumerate() {
            let h = crate::types::Integer::new(*k).hash();
            unsafe {
                t.write_entry(slot, h, &k.to_le_bytes(), &v.to_le_bytes());
                t.link(slot);
            }
        }

        // key 2 chains two entries, in unspecified order
        let h2 = crate::types::Integer::new(2).hash();
        let mut found = Vec::new();
        let mut off = t.bucket_head(h2);
        while off != EMPTY {
            unsafe {
                if t.hash_at(off) == h2 {
                    let k = (t.key_ptr(off) as *const i32).read_unaligned();
                    assert_eq!(k, 2);
                    found.push((t.payload_ptr(off) as *const i64).read_unaligned());
                }
                off = t.next(off);
            }
        }
        found.sort_unstable();
        assert_eq!(found, vec![20, 21]);

        // absent key finds nothing on its chain
        let h9 = hash_bits(9);
        let mut off = t.bucket_head(h9);
        let mut hits = 0;
        while off != EMPTY {
            unsafe {
                if t.hash_at(off) == h9 {
                    hits += 1;
                }
                off = t.next(off);
            }
        }
        assert_eq!(hits, 0);
    }

    #[test]
    fn entry_stride_is_aligned() {
        assert_eq!(entry_size_for(4, 0), 24);
        assert_eq!(entry_size_for(4, 8), 32);
        assert_eq!(entry_size_for(8, 16), 40);
    }
}
