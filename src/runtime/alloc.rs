// Per-thread vector allocation.
//
// Operators obtain their batch buffers from a thread-local bump allocator
// carved out of 2 MiB chunks. Chunks come from a shared GlobalPool and are
// returned wholesale when the allocator is reset between queries; individual
// buffers are never freed. Allocation therefore costs a pointer bump and all
// buffers a thread touches stay local to it.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DbError, Result};
use crate::simd::align::align_up;

/// Chunk granularity handed out by the global pool.
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Alignment of every chunk and of every buffer carved from one.
pub const BUFFER_ALIGN: usize = 64;

struct Chunk {
    ptr: NonNull<u8>,
}

unsafe impl Send for Chunk {}

impl Chunk {
    fn layout() -> Layout {
        Layout::from_size_align(CHUNK_SIZE, BUFFER_ALIGN).expect("chunk layout")
    }

    fn alloc() -> Result<Self> {
        let ptr = unsafe { alloc::alloc(Self::layout()) };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr })
            .ok_or_else(|| DbError::Resource("chunk allocation failed".into()))
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout()) };
    }
}

/// Shared source of chunks. Freed chunks are kept on a freelist for reuse
/// across queries.
#[derive(Default)]
pub struct GlobalPool {
    free: Mutex<Vec<Chunk>>,
}

impl GlobalPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> Result<Chunk> {
        if let Some(chunk) = self.free.lock().pop() {
            return Ok(chunk);
        }
        Chunk::alloc()
    }

    fn release(&self, chunks: &mut Vec<Chunk>) {
        self.free.lock().append(chunks);
    }

    /// Chunks currently parked on the freelist.
    pub fn free_chunks(&self) -> usize {
        self.free.lock().len()
    }
}

/// Thread-local bump allocator over pool chunks.
pub struct VectorAllocator {
    source: Option<Arc<GlobalPool>>,
    chunks: Vec<Chunk>,
    cursor: usize,
}

impl Default for VectorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorAllocator {
    pub fn new() -> Self {
        Self { source: None, chunks: Vec::new(), cursor: CHUNK_SIZE }
    }

    /// Install a chunk source, returning the previous one so a scope can
    /// restore it on exit.
    pub fn set_source(&mut self, source: Option<Arc<GlobalPool>>) -> Option<Arc<GlobalPool>> {
        std::mem::replace(&mut self.source, source)
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Carve `bytes` (rounded up to the buffer alignment) out of the current
    /// chunk. Buffers live until `reset`.
    pub fn alloc(&mut self, bytes: usize) -> Result<NonNull<u8>> {
        let bytes = align_up(bytes, BUFFER_ALIGN);
        if bytes > CHUNK_SIZE {
            return Err(DbError::Resource(format!(
                "buffer of {bytes} bytes exceeds chunk size {CHUNK_SIZE}"
            )));
        }
        if self.cursor + bytes > CHUNK_SIZE {
            let source = self
                .source
                .as_ref()
                .ok_or_else(|| DbError::Resource("vector allocator has no source".into()))?;
            self.chunks.push(source.acquire()?);
            self.cursor = 0;
        }
        let base = self.chunks.last().expect("chunk present").ptr;
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(self.cursor)) };
        self.cursor += bytes;
        Ok(ptr)
    }

    /// Return every chunk to the source. Invalidates all buffers handed out
    /// since the last reset.
    pub fn reset(&mut self) {
        if let Some(source) = &self.source {
            source.release(&mut self.chunks);
        } else {
            self.chunks.clear();
        }
        self.cursor = CHUNK_SIZE;
    }
}

impl Drop for VectorAllocator {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation_is_aligned_and_disjoint() {
        let pool = Arc::new(GlobalPool::new());
        let mut a = VectorAllocator::new();
        a.set_source(Some(pool.clone()));

        let p1 = a.alloc(100).unwrap();
        let p2 = a.alloc(100).unwrap();
        assert_eq!(p1.as_ptr() as usize % BUFFER_ALIGN, 0);
        assert_eq!(p2.as_ptr() as usize % BUFFER_ALIGN, 0);
        assert!(p2.as_ptr() as usize >= p1.as_ptr() as usize + 128);
    }

    #[test]
    fn reset_returns_chunks_to_the_pool() {
        let pool = Arc::new(GlobalPool::new());
        let mut a = VectorAllocator::new();
        a.set_source(Some(pool.clone()));
        a.alloc(1024).unwrap();
        assert_eq!(pool.free_chunks(), 0);
        a.reset();
        assert_eq!(pool.free_chunks(), 1);
        // reuse after reset pulls the same chunk back
        a.alloc(1024).unwrap();
        assert_eq!(pool.free_chunks(), 0);
    }

    #[test]
    fn allocation_without_source_fails() {
        let mut a = VectorAllocator::new();
        assert!(matches!(a.alloc(16), Err(DbError::Resource(_))));
    }

    #[test]
    fn oversized_allocation_fails() {
        let pool = Arc::new(GlobalPool::new());
        let mut a = VectorAllocator::new();
        a.set_source(Some(pool));
        assert!(matches!(a.alloc(CHUNK_SIZE + 1), Err(DbError::Resource(_))));
    }

    #[test]
    fn set_source_returns_previous() {
        let p1 = Arc::new(GlobalPool::new());
        let p2 = Arc::new(GlobalPool::new());
        let mut a = VectorAllocator::new();
        assert!(a.set_source(Some(p1.clone())).is_none());
        let prev = a.set_source(Some(p2));
        assert!(Arc::ptr_eq(&prev.unwrap(), &p1));
    }
}
