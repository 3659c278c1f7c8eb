// Primitive kernel library.
//
// A primitive is a pure, stateless, type-specialized kernel with one of
// three shapes, mirrored from the operand order the expression builder uses.
// Parameters are untyped pointers; each kernel casts to its element types.
// The row-count argument is the batch size for dense kernels and the
// selection-vector length for sel-driven kernels; the return value is the
// produced count (selected rows for filters, the input count otherwise).
//
// Every kernel family has a branch-free scalar implementation and, for
// 32/64-bit columns, an AVX2 implementation that must produce bit-identical
// output. Which one runs is decided once per query by `EngineConfig`.

use std::ffi::c_void;

pub mod aggregate;
#[cfg(target_arch = "x86_64")]
pub mod avx2;
pub mod hash;
pub mod project;
pub mod select;

/// Dense two-operand kernel: `(out, in)` or `(accumulator, in)`.
pub type F2 = unsafe fn(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize;

/// Three-operand kernel: `(out, a, b)`, e.g. dense filter or projection.
pub type F3 = unsafe fn(n: usize, p1: *mut c_void, p2: *mut c_void, p3: *mut c_void) -> usize;

/// Four-operand kernel: `(sel_in, out, a, b)`, e.g. sel-vec refinement or
/// sel-driven binary projection.
pub type F4 = unsafe fn(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
    p4: *mut c_void,
) -> usize;

/// Bit pattern of a column element as fed to the hash mix. 32-bit values
/// sign-extend, matching the scalar-type hash definitions.
pub trait ToBits: Copy {
    fn to_bits(self) -> u64;
}

impl ToBits for i32 {
    #[inline(always)]
    fn to_bits(self) -> u64 {
        self as i64 as u64
    }
}

impl ToBits for i64 {
    #[inline(always)]
    fn to_bits(self) -> u64 {
        self as u64
    }
}

impl ToBits for u64 {
    #[inline(always)]
    fn to_bits(self) -> u64 {
        self
    }
}
