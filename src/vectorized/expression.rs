// Expressions bind primitives to their operands.
//
// An expression is an ordered list of (primitive, operand) pairs; evaluating
// it runs each primitive over the current batch, threading the row count
// through: a selection primitive's output count becomes the next
// primitive's input count. Operands resolve to raw pointers (a scan-cursor
// column base, a constant in the query's const block, or a per-thread buffer
// slab), so a primitive call is exactly one indirect call over raw memory.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::Result;
use crate::runtime::this_worker;
use crate::storage::Column;
use crate::vectorized::primitives::{F2, F3, F4};

/// Per-batch read position of one scanned column. The scan advances
/// `current` before each batch; operands snapshot it at evaluation time.
pub struct ColumnCursor {
    current: Cell<*const u8>,
    base: *const u8,
    stride: usize,
}

impl ColumnCursor {
    pub fn new(column: &Column) -> Rc<Self> {
        Rc::new(Self {
            current: Cell::new(column.as_ptr()),
            base: column.as_ptr(),
            stride: column.rt_size(),
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Position the cursor at absolute row `row`.
    pub fn seek(&self, row: usize) {
        self.current
            .set(unsafe { self.base.add(row * self.stride) });
    }

    pub fn current(&self) -> *const u8 {
        self.current.get()
    }
}

/// Handle to a buffer slab owned by the thread's vector allocator. Valid for
/// the query; copies alias the same memory.
#[derive(Clone, Copy)]
pub struct BufPtr {
    ptr: NonNull<u8>,
}

impl BufPtr {
    pub fn as_ptr<T>(&self) -> *mut T {
        self.ptr.as_ptr() as *mut T
    }

    /// Read element `i` of the buffer as `T`.
    ///
    /// # Safety
    /// `i` must be within the buffer and the slab must hold `T` elements.
    pub unsafe fn read<T: Copy>(&self, i: usize) -> T {
        *(self.ptr.as_ptr() as *const T).add(i)
    }
}

/// Registry of the numbered buffers an operator tree shares. Buffers are
/// allocated from the thread's vector allocator on first use; requesting the
/// same id again returns the same slab.
pub struct QueryBuffers {
    vector_size: usize,
    slabs: HashMap<u32, BufPtr>,
}

impl QueryBuffers {
    pub fn new(vector_size: usize) -> Self {
        Self { vector_size, slabs: HashMap::new() }
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// The buffer `id`, sized for `elem_size`-byte elements.
    pub fn get(&mut self, id: u32, elem_size: usize) -> Result<BufPtr> {
        if let Some(&b) = self.slabs.get(&id) {
            return Ok(b);
        }
        let ctx = this_worker();
        let bytes = self.vector_size * elem_size;
        let ptr = ctx.allocator.borrow_mut().alloc(bytes)?;
        let b = BufPtr { ptr };
        self.slabs.insert(id, b);
        Ok(b)
    }
}

/// A primitive operand.
#[derive(Clone)]
pub enum Operand {
    /// Scanned column, read at the scan's current batch offset.
    Column(Rc<ColumnCursor>),
    /// Constant scalar or accumulator; the pointer targets the query's
    /// const block. Bindings a kernel writes through (static aggregation)
    /// must be backed by an `UnsafeCell` field there.
    Value(*const c_void),
    /// Per-thread buffer slab.
    Buffer(BufPtr),
}

impl Operand {
    #[inline]
    fn resolve(&self) -> *mut c_void {
        match self {
            Operand::Column(c) => c.current() as *mut c_void,
            Operand::Value(p) => *p as *mut c_void,
            Operand::Buffer(b) => b.as_ptr::<c_void>(),
        }
    }
}

/// Uniform byte-level access to one value source, used where operators copy
/// or compare raw key/payload bytes (hash join scatter, group keys).
/// `logical` indexes the batch's surviving rows, `phys` the underlying
/// column row (they differ when a selection vector is in play).
#[derive(Clone)]
pub enum Access {
    /// Scanned column cell, addressed by physical row.
    Column { cursor: Rc<ColumnCursor>, size: usize },
    /// Dense buffer, addressed by logical row.
    Buffer { buf: BufPtr, size: usize },
    /// Field of a hash-join build entry; `entries` holds one payload pointer
    /// per logical row.
    Entry { entries: BufPtr, offset: usize, size: usize },
}

impl Access {
    pub fn size(&self) -> usize {
        match self {
            Access::Column { size, .. }
            | Access::Buffer { size, .. }
            | Access::Entry { size, .. } => *size,
        }
    }

    /// Pointer to the value for the given row pair.
    ///
    /// # Safety
    /// Row indices must lie inside the current batch and every backing
    /// buffer must outlive the call.
    #[inline]
    pub unsafe fn value_ptr(&self, logical: usize, phys: usize) -> *const u8 {
        match self {
            Access::Column { cursor, size } => cursor.current().add(phys * size),
            Access::Buffer { buf, size } => (buf.as_ptr::<u8>() as *const u8).add(logical * size),
            Access::Entry { entries, offset, size: _ } => {
                let payload: *const u8 = entries.read::<*const u8>(logical);
                payload.add(*offset)
            }
        }
    }
}

enum Prim {
    F2 { f: F2, p1: Operand, p2: Operand },
    F3 { f: F3, p1: Operand, p2: Operand, p3: Operand },
    F4 { f: F4, p1: Operand, p2: Operand, p3: Operand, p4: Operand },
}

/// Ordered list of bound primitives.
#[derive(Default)]
pub struct Expression {
    ops: Vec<Prim>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f2(mut self, f: F2, p1: Operand, p2: Operand) -> Self {
        self.ops.push(Prim::F2 { f, p1, p2 });
        self
    }

    pub fn add_f3(mut self, f: F3, p1: Operand, p2: Operand, p3: Operand) -> Self {
        self.ops.push(Prim::F3 { f, p1, p2, p3 });
        self
    }

    pub fn add_f4(mut self, f: F4, p1: Operand, p2: Operand, p3: Operand, p4: Operand) -> Self {
        self.ops.push(Prim::F4 { f, p1, p2, p3, p4 });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run every primitive over the current batch of `n` rows; each
    /// primitive's result count feeds the next one. Returns the last count.
    ///
    /// # Safety
    /// All bound buffers must be sized for the configured vector size and
    /// column cursors must be positioned on a batch of at least `n` rows.
    pub unsafe fn evaluate(&self, n: usize) -> usize {
        let mut n = n;
        for op in &self.ops {
            n = match op {
                Prim::F2 { f, p1, p2 } => f(n, p1.resolve(), p2.resolve()),
                Prim::F3 { f, p1, p2, p3 } => f(n, p1.resolve(), p2.resolve(), p3.resolve()),
                Prim::F4 { f, p1, p2, p3, p4 } => {
                    f(n, p1.resolve(), p2.resolve(), p3.resolve(), p4.resolve())
                }
            };
        }
        n
    }
}
