// A column is a contiguous, 64-byte-aligned buffer of fixed-size elements.
// Columns are append-only while a relation is populated and read-only during
// query execution; primitives read them through raw base pointers. Result
// columns may be rebuilt with `reset` + `push`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::types::{Scalar, ScalarKind};

/// Buffers are aligned to the cache line so SIMD kernels can use aligned
/// loads on the fast path.
pub const COLUMN_ALIGN: usize = 64;

#[derive(Debug)]
pub struct Column {
    kind: ScalarKind,
    data: NonNull<u8>,
    len: usize,
    cap: usize,
}

// The buffer is uniquely owned and only handed out as shared slices.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    pub fn new(kind: ScalarKind) -> Self {
        Self { kind, data: NonNull::dangling(), len: 0, cap: 0 }
    }

    pub fn with_capacity(kind: ScalarKind, n: usize) -> Self {
        let mut c = Self::new(kind);
        c.reserve(n);
        c
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Element stride in bytes.
    pub fn rt_size(&self) -> usize {
        self.kind.rt_size()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn layout(&self, elems: usize) -> Layout {
        Layout::from_size_align(elems * self.rt_size(), COLUMN_ALIGN)
            .expect("column layout overflow")
    }

    fn reserve(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed <= self.cap {
            return;
        }
        let new_cap = needed.max(self.cap * 2).max(1024);
        let new_layout = self.layout(new_cap);
        let new_ptr = unsafe { alloc::alloc(new_layout) };
        let Some(new_ptr) = NonNull::new(new_ptr) else {
            alloc::handle_alloc_error(new_layout);
        };
        if self.cap > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.data.as_ptr(),
                    new_ptr.as_ptr(),
                    self.len * self.rt_size(),
                );
                alloc::dealloc(self.data.as_ptr(), self.layout(self.cap));
            }
        }
        self.data = new_ptr;
        self.cap = new_cap;
    }

    /// Discard all rows and make room for `n` new ones.
    pub fn reset(&mut self, n: usize) {
        self.len = 0;
        self.reserve(n);
    }

    /// Append a value. The element type must match the column kind.
    pub fn push<T: Scalar>(&mut self, v: T) {
        assert_eq!(T::kind(), self.kind, "column element type mismatch");
        debug_assert_eq!(std::mem::size_of::<T>(), self.rt_size());
        self.reserve(1);
        unsafe {
            let dst = self.data.as_ptr().add(self.len * self.rt_size()) as *mut T;
            dst.write_unaligned(v);
        }
        self.len += 1;
    }

    /// Append a string cell as raw prefix + bytes + zeroed tail. Used by the
    /// importer, where the capacity is only known from the column kind.
    pub fn push_str_cell(&mut self, bytes: &[u8]) {
        let cap = match self.kind {
            ScalarKind::Char(n) | ScalarKind::Varchar(n) => n as usize,
            other => panic!("push_str_cell on non-string column {other:?}"),
        };
        assert!(bytes.len() <= cap, "string cell exceeds column capacity");
        let stride = self.rt_size();
        self.reserve(1);
        unsafe {
            let dst = self.data.as_ptr().add(self.len * stride);
            std::ptr::write_bytes(dst, 0, stride);
            *dst = bytes.len() as u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.add(1), bytes.len());
        }
        self.len += 1;
    }

    /// Typed read access to the whole column.
    pub fn data<T: Scalar>(&self) -> &[T] {
        assert_eq!(T::kind(), self.kind, "column element type mismatch");
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data.as_ptr() as *const T, self.len) }
    }

    pub fn get<T: Scalar>(&self, i: usize) -> T {
        assert!(i < self.len);
        assert_eq!(T::kind(), self.kind, "column element type mismatch");
        unsafe {
            (self.data.as_ptr().add(i * self.rt_size()) as *const T).read_unaligned()
        }
    }

    /// Raw base pointer for primitive kernels.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.cap > 0 {
            unsafe { alloc::dealloc(self.data.as_ptr(), self.layout(self.cap)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Char, Integer, Numeric};

    #[test]
    fn push_and_read_back() {
        let mut c = Column::new(ScalarKind::Integer);
        for i in 0..3000 {
            c.push(Integer::new(i));
        }
        assert_eq!(c.len(), 3000);
        let s = c.data::<Integer>();
        assert_eq!(s[0].value, 0);
        assert_eq!(s[2999].value, 2999);
        assert_eq!(c.get::<Integer>(17).value, 17);
    }

    #[test]
    fn base_pointer_is_cache_aligned() {
        let mut c = Column::new(ScalarKind::Numeric(2));
        c.push(Numeric::<2>::from_raw(5));
        assert_eq!(c.as_ptr() as usize % COLUMN_ALIGN, 0);
        assert_eq!(c.rt_size(), 8);
    }

    #[test]
    fn reset_discards_rows() {
        let mut c = Column::new(ScalarKind::Integer);
        c.push(Integer::new(1));
        c.reset(10);
        assert!(c.is_empty());
        c.push(Integer::new(2));
        assert_eq!(c.get::<Integer>(0).value, 2);
    }

    #[test]
    fn string_cells_round_trip() {
        let mut c = Column::new(ScalarKind::Char(10));
        c.push_str_cell(b"BUILDING");
        c.push_str_cell(b"AUTOMOBILE");
        let s = c.data::<Char<10>>();
        assert_eq!(s[0].as_str(), "BUILDING");
        assert_eq!(s[1].as_str(), "AUTOMOBILE");
        assert_eq!(c.rt_size(), 11);
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn typed_access_checks_kind() {
        let c = Column::new(ScalarKind::Integer);
        let _ = c.data::<Numeric<2>>();
    }
}
