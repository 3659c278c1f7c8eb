// AVX2 implementations of the primitive families.
//
// Comparisons produce a lane mask; qualifying positions are emitted with a
// compressed store (mask-bit iteration), which keeps selection output
// identical to the branch-free scalar kernels. 64-bit multiplication is
// composed from 32-bit partial products since AVX2 has no vpmullq.
//
// Callers must have verified AVX2 support; `EngineConfig` only hands these
// kernels out after checking the cached CPU features.

#![allow(clippy::missing_safety_doc)]

use std::arch::x86_64::*;
use std::ffi::c_void;

use crate::types::HASH_SEED;
use crate::vectorized::Pos;

// --- mask helpers ----------------------------------------------------------

#[inline(always)]
unsafe fn mask8_eq(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpeq_epi32(v, p))) as u32
}

#[inline(always)]
unsafe fn mask8_ne(v: __m256i, p: __m256i) -> u32 {
    mask8_eq(v, p) ^ 0xFF
}

#[inline(always)]
unsafe fn mask8_lt(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpgt_epi32(p, v))) as u32
}

#[inline(always)]
unsafe fn mask8_gt(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpgt_epi32(v, p))) as u32
}

#[inline(always)]
unsafe fn mask8_le(v: __m256i, p: __m256i) -> u32 {
    mask8_gt(v, p) ^ 0xFF
}

#[inline(always)]
unsafe fn mask8_ge(v: __m256i, p: __m256i) -> u32 {
    mask8_lt(v, p) ^ 0xFF
}

#[inline(always)]
unsafe fn mask4_eq(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpeq_epi64(v, p))) as u32
}

#[inline(always)]
unsafe fn mask4_ne(v: __m256i, p: __m256i) -> u32 {
    mask4_eq(v, p) ^ 0xF
}

#[inline(always)]
unsafe fn mask4_lt(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpgt_epi64(p, v))) as u32
}

#[inline(always)]
unsafe fn mask4_gt(v: __m256i, p: __m256i) -> u32 {
    _mm256_movemask_pd(_mm256_castsi256_pd(_mm256_cmpgt_epi64(v, p))) as u32
}

#[inline(always)]
unsafe fn mask4_le(v: __m256i, p: __m256i) -> u32 {
    mask4_gt(v, p) ^ 0xF
}

#[inline(always)]
unsafe fn mask4_ge(v: __m256i, p: __m256i) -> u32 {
    mask4_lt(v, p) ^ 0xF
}

/// Compressed store of the set lanes as positions `base + lane`.
#[inline(always)]
unsafe fn emit_positions(mut mask: u32, base: usize, out: *mut Pos, k: &mut usize) {
    while mask != 0 {
        let lane = mask.trailing_zeros() as usize;
        *out.add(*k) = (base + lane) as Pos;
        *k += 1;
        mask &= mask - 1;
    }
}

/// Compressed store of the selected input positions for refinement kernels.
#[inline(always)]
unsafe fn emit_selected(mut mask: u32, sel: *const Pos, base: usize, out: *mut Pos, k: &mut usize) {
    while mask != 0 {
        let lane = mask.trailing_zeros() as usize;
        *out.add(*k) = *sel.add(base + lane);
        *k += 1;
        mask &= mask - 1;
    }
}

/// Low 64 bits of a 64x64 multiply from 32-bit partial products.
#[inline(always)]
unsafe fn mullo_epi64(a: __m256i, b: __m256i) -> __m256i {
    let lo = _mm256_mul_epu32(a, b);
    let a_hi = _mm256_srli_epi64(a, 32);
    let b_hi = _mm256_srli_epi64(b, 32);
    let cross = _mm256_add_epi64(_mm256_mul_epu32(a, b_hi), _mm256_mul_epu32(a_hi, b));
    _mm256_add_epi64(lo, _mm256_slli_epi64(cross, 32))
}

/// One xorshift round over four 64-bit lanes.
#[inline(always)]
unsafe fn xorshift4(mut h: __m256i) -> __m256i {
    h = _mm256_xor_si256(h, _mm256_slli_epi64(h, 13));
    h = _mm256_xor_si256(h, _mm256_srli_epi64(h, 7));
    _mm256_xor_si256(h, _mm256_slli_epi64(h, 17))
}

// --- selection -------------------------------------------------------------

macro_rules! sel_avx2_i32 {
    ($dense:ident, $dense_impl:ident, $refine:ident, $refine_impl:ident,
     $mask:ident, $op:tt) => {
        pub unsafe fn $dense(n: usize, p1: *mut c_void, p2: *mut c_void, p3: *mut c_void) -> usize {
            $dense_impl(n, p1, p2, p3)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $dense_impl(
            n: usize,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let out = sel_out as *mut Pos;
            let col = col as *const i32;
            let v = *(val as *const i32);
            let pivot = _mm256_set1_epi32(v);
            let mut k = 0usize;
            let chunks = n / 8;
            for c in 0..chunks {
                let vals = _mm256_loadu_si256(col.add(c * 8) as *const __m256i);
                emit_positions($mask(vals, pivot), c * 8, out, &mut k);
            }
            for i in chunks * 8..n {
                *out.add(k) = i as Pos;
                k += (*col.add(i) $op v) as usize;
            }
            k
        }

        pub unsafe fn $refine(
            n: usize,
            p1: *mut c_void,
            p2: *mut c_void,
            p3: *mut c_void,
            p4: *mut c_void,
        ) -> usize {
            $refine_impl(n, p1, p2, p3, p4)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $refine_impl(
            n: usize,
            sel_in: *mut c_void,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let sel = sel_in as *const Pos;
            let out = sel_out as *mut Pos;
            let col = col as *const i32;
            let v = *(val as *const i32);
            let pivot = _mm256_set1_epi32(v);
            let mut k = 0usize;
            let chunks = n / 8;
            for c in 0..chunks {
                let idx = _mm256_loadu_si256(sel.add(c * 8) as *const __m256i);
                let vals = _mm256_i32gather_epi32::<4>(col, idx);
                emit_selected($mask(vals, pivot), sel, c * 8, out, &mut k);
            }
            for i in chunks * 8..n {
                let idx = *sel.add(i);
                *out.add(k) = idx;
                k += (*col.add(idx as usize) $op v) as usize;
            }
            k
        }
    };
}

macro_rules! sel_avx2_i64 {
    ($dense:ident, $dense_impl:ident, $refine:ident, $refine_impl:ident,
     $mask:ident, $op:tt) => {
        pub unsafe fn $dense(n: usize, p1: *mut c_void, p2: *mut c_void, p3: *mut c_void) -> usize {
            $dense_impl(n, p1, p2, p3)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $dense_impl(
            n: usize,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let out = sel_out as *mut Pos;
            let col = col as *const i64;
            let v = *(val as *const i64);
            let pivot = _mm256_set1_epi64x(v);
            let mut k = 0usize;
            let chunks = n / 4;
            for c in 0..chunks {
                let vals = _mm256_loadu_si256(col.add(c * 4) as *const __m256i);
                emit_positions($mask(vals, pivot), c * 4, out, &mut k);
            }
            for i in chunks * 4..n {
                *out.add(k) = i as Pos;
                k += (*col.add(i) $op v) as usize;
            }
            k
        }

        pub unsafe fn $refine(
            n: usize,
            p1: *mut c_void,
            p2: *mut c_void,
            p3: *mut c_void,
            p4: *mut c_void,
        ) -> usize {
            $refine_impl(n, p1, p2, p3, p4)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $refine_impl(
            n: usize,
            sel_in: *mut c_void,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let sel = sel_in as *const Pos;
            let out = sel_out as *mut Pos;
            let col = col as *const i64;
            let v = *(val as *const i64);
            let pivot = _mm256_set1_epi64x(v);
            let mut k = 0usize;
            let chunks = n / 4;
            for c in 0..chunks {
                let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
                let vals = _mm256_i32gather_epi64::<8>(col, idx);
                emit_selected($mask(vals, pivot), sel, c * 4, out, &mut k);
            }
            for i in chunks * 4..n {
                let idx = *sel.add(i);
                *out.add(k) = idx;
                k += (*col.add(idx as usize) $op v) as usize;
            }
            k
        }
    };
}

sel_avx2_i32!(sel_equal_i32_col_val_avx2, sel_eq_i32_impl,
    selsel_equal_i32_col_val_avx2, selsel_eq_i32_impl, mask8_eq, ==);
sel_avx2_i32!(sel_not_equal_i32_col_val_avx2, sel_ne_i32_impl,
    selsel_not_equal_i32_col_val_avx2, selsel_ne_i32_impl, mask8_ne, !=);
sel_avx2_i32!(sel_less_i32_col_val_avx2, sel_lt_i32_impl,
    selsel_less_i32_col_val_avx2, selsel_lt_i32_impl, mask8_lt, <);
sel_avx2_i32!(sel_less_equal_i32_col_val_avx2, sel_le_i32_impl,
    selsel_less_equal_i32_col_val_avx2, selsel_le_i32_impl, mask8_le, <=);
sel_avx2_i32!(sel_greater_i32_col_val_avx2, sel_gt_i32_impl,
    selsel_greater_i32_col_val_avx2, selsel_gt_i32_impl, mask8_gt, >);
sel_avx2_i32!(sel_greater_equal_i32_col_val_avx2, sel_ge_i32_impl,
    selsel_greater_equal_i32_col_val_avx2, selsel_ge_i32_impl, mask8_ge, >=);

sel_avx2_i64!(sel_equal_i64_col_val_avx2, sel_eq_i64_impl,
    selsel_equal_i64_col_val_avx2, selsel_eq_i64_impl, mask4_eq, ==);
sel_avx2_i64!(sel_not_equal_i64_col_val_avx2, sel_ne_i64_impl,
    selsel_not_equal_i64_col_val_avx2, selsel_ne_i64_impl, mask4_ne, !=);
sel_avx2_i64!(sel_less_i64_col_val_avx2, sel_lt_i64_impl,
    selsel_less_i64_col_val_avx2, selsel_lt_i64_impl, mask4_lt, <);
sel_avx2_i64!(sel_less_equal_i64_col_val_avx2, sel_le_i64_impl,
    selsel_less_equal_i64_col_val_avx2, selsel_le_i64_impl, mask4_le, <=);
sel_avx2_i64!(sel_greater_i64_col_val_avx2, sel_gt_i64_impl,
    selsel_greater_i64_col_val_avx2, selsel_gt_i64_impl, mask4_gt, >);
sel_avx2_i64!(sel_greater_equal_i64_col_val_avx2, sel_ge_i64_impl,
    selsel_greater_equal_i64_col_val_avx2, selsel_ge_i64_impl, mask4_ge, >=);

// --- hashing ---------------------------------------------------------------

pub unsafe fn hash_i32_col_avx2(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize {
    hash_i32_impl(n, p1, p2)
}

#[target_feature(enable = "avx2")]
unsafe fn hash_i32_impl(n: usize, out: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut u64;
    let col = col as *const i32;
    let seed = _mm256_set1_epi64x(HASH_SEED as i64);
    let chunks = n / 4;
    for c in 0..chunks {
        let narrow = _mm_loadu_si128(col.add(c * 4) as *const __m128i);
        let v = _mm256_cvtepi32_epi64(narrow);
        let h = xorshift4(_mm256_xor_si256(seed, v));
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        *out.add(i) = crate::types::hash_bits(*col.add(i) as i64 as u64);
    }
    n
}

pub unsafe fn hash_i64_col_avx2(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize {
    hash_i64_impl(n, p1, p2)
}

#[target_feature(enable = "avx2")]
unsafe fn hash_i64_impl(n: usize, out: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut u64;
    let col = col as *const i64;
    let seed = _mm256_set1_epi64x(HASH_SEED as i64);
    let chunks = n / 4;
    for c in 0..chunks {
        let v = _mm256_loadu_si256(col.add(c * 4) as *const __m256i);
        let h = xorshift4(_mm256_xor_si256(seed, v));
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        *out.add(i) = crate::types::hash_bits(*col.add(i) as u64);
    }
    n
}

pub unsafe fn rehash_i32_col_avx2(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize {
    rehash_i32_impl(n, p1, p2)
}

#[target_feature(enable = "avx2")]
unsafe fn rehash_i32_impl(n: usize, hashes: *mut c_void, col: *mut c_void) -> usize {
    let hashes = hashes as *mut u64;
    let col = col as *const i32;
    let chunks = n / 4;
    for c in 0..chunks {
        let narrow = _mm_loadu_si128(col.add(c * 4) as *const __m128i);
        let v = _mm256_cvtepi32_epi64(narrow);
        let h = _mm256_loadu_si256(hashes.add(c * 4) as *const __m256i);
        let h = xorshift4(_mm256_xor_si256(h, v));
        _mm256_storeu_si256(hashes.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        *hashes.add(i) = crate::types::rehash_bits(*hashes.add(i), *col.add(i) as i64 as u64);
    }
    n
}

pub unsafe fn rehash_i64_col_avx2(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize {
    rehash_i64_impl(n, p1, p2)
}

#[target_feature(enable = "avx2")]
unsafe fn rehash_i64_impl(n: usize, hashes: *mut c_void, col: *mut c_void) -> usize {
    let hashes = hashes as *mut u64;
    let col = col as *const i64;
    let chunks = n / 4;
    for c in 0..chunks {
        let v = _mm256_loadu_si256(col.add(c * 4) as *const __m256i);
        let h = _mm256_loadu_si256(hashes.add(c * 4) as *const __m256i);
        let h = xorshift4(_mm256_xor_si256(h, v));
        _mm256_storeu_si256(hashes.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        *hashes.add(i) = crate::types::rehash_bits(*hashes.add(i), *col.add(i) as u64);
    }
    n
}

pub unsafe fn hash_sel_i32_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
) -> usize {
    hash_sel_i32_impl(n, p1, p2, p3)
}

#[target_feature(enable = "avx2")]
unsafe fn hash_sel_i32_impl(n: usize, out: *mut c_void, sel: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const i32;
    let seed = _mm256_set1_epi64x(HASH_SEED as i64);
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let narrow = _mm_i32gather_epi32::<4>(col, idx);
        let v = _mm256_cvtepi32_epi64(narrow);
        let h = xorshift4(_mm256_xor_si256(seed, v));
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        let idx = *sel.add(i) as usize;
        *out.add(i) = crate::types::hash_bits(*col.add(idx) as i64 as u64);
    }
    n
}

pub unsafe fn hash_sel_i64_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
) -> usize {
    hash_sel_i64_impl(n, p1, p2, p3)
}

#[target_feature(enable = "avx2")]
unsafe fn hash_sel_i64_impl(n: usize, out: *mut c_void, sel: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const i64;
    let seed = _mm256_set1_epi64x(HASH_SEED as i64);
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let v = _mm256_i32gather_epi64::<8>(col, idx);
        let h = xorshift4(_mm256_xor_si256(seed, v));
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        let idx = *sel.add(i) as usize;
        *out.add(i) = crate::types::hash_bits(*col.add(idx) as u64);
    }
    n
}

pub unsafe fn rehash_sel_i32_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
) -> usize {
    rehash_sel_i32_impl(n, p1, p2, p3)
}

#[target_feature(enable = "avx2")]
unsafe fn rehash_sel_i32_impl(
    n: usize,
    hashes: *mut c_void,
    sel: *mut c_void,
    col: *mut c_void,
) -> usize {
    let hashes = hashes as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const i32;
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let narrow = _mm_i32gather_epi32::<4>(col, idx);
        let v = _mm256_cvtepi32_epi64(narrow);
        let h = _mm256_loadu_si256(hashes.add(c * 4) as *const __m256i);
        let h = xorshift4(_mm256_xor_si256(h, v));
        _mm256_storeu_si256(hashes.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        let idx = *sel.add(i) as usize;
        *hashes.add(i) = crate::types::rehash_bits(*hashes.add(i), *col.add(idx) as i64 as u64);
    }
    n
}

pub unsafe fn rehash_sel_i64_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
) -> usize {
    rehash_sel_i64_impl(n, p1, p2, p3)
}

#[target_feature(enable = "avx2")]
unsafe fn rehash_sel_i64_impl(
    n: usize,
    hashes: *mut c_void,
    sel: *mut c_void,
    col: *mut c_void,
) -> usize {
    let hashes = hashes as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const i64;
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let v = _mm256_i32gather_epi64::<8>(col, idx);
        let h = _mm256_loadu_si256(hashes.add(c * 4) as *const __m256i);
        let h = xorshift4(_mm256_xor_si256(h, v));
        _mm256_storeu_si256(hashes.add(c * 4) as *mut __m256i, h);
    }
    for i in chunks * 4..n {
        let idx = *sel.add(i) as usize;
        *hashes.add(i) = crate::types::rehash_bits(*hashes.add(i), *col.add(idx) as u64);
    }
    n
}

// --- projection ------------------------------------------------------------

macro_rules! proj_avx2 {
    ($col_col:ident, $cc_impl:ident, $col_val:ident, $cv_impl:ident,
     $sel_both:ident, $sb_impl:ident, $vec:ident, $m:ident) => {
        pub unsafe fn $col_col(n: usize, p1: *mut c_void, p2: *mut c_void, p3: *mut c_void) -> usize {
            $cc_impl(n, p1, p2, p3)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $cc_impl(n: usize, out: *mut c_void, a: *mut c_void, b: *mut c_void) -> usize {
            let out = out as *mut i64;
            let a = a as *const i64;
            let b = b as *const i64;
            let chunks = n / 4;
            for c in 0..chunks {
                let va = _mm256_loadu_si256(a.add(c * 4) as *const __m256i);
                let vb = _mm256_loadu_si256(b.add(c * 4) as *const __m256i);
                _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, $vec(va, vb));
            }
            for i in chunks * 4..n {
                *out.add(i) = (*a.add(i)).$m(*b.add(i));
            }
            n
        }

        pub unsafe fn $col_val(n: usize, p1: *mut c_void, p2: *mut c_void, p3: *mut c_void) -> usize {
            $cv_impl(n, p1, p2, p3)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $cv_impl(n: usize, out: *mut c_void, a: *mut c_void, val: *mut c_void) -> usize {
            let out = out as *mut i64;
            let a = a as *const i64;
            let v = *(val as *const i64);
            let vb = _mm256_set1_epi64x(v);
            let chunks = n / 4;
            for c in 0..chunks {
                let va = _mm256_loadu_si256(a.add(c * 4) as *const __m256i);
                _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, $vec(va, vb));
            }
            for i in chunks * 4..n {
                *out.add(i) = (*a.add(i)).$m(v);
            }
            n
        }

        pub unsafe fn $sel_both(
            n: usize,
            p1: *mut c_void,
            p2: *mut c_void,
            p3: *mut c_void,
            p4: *mut c_void,
        ) -> usize {
            $sb_impl(n, p1, p2, p3, p4)
        }

        #[target_feature(enable = "avx2")]
        unsafe fn $sb_impl(
            n: usize,
            sel: *mut c_void,
            out: *mut c_void,
            a: *mut c_void,
            b: *mut c_void,
        ) -> usize {
            let sel = sel as *const Pos;
            let out = out as *mut i64;
            let a = a as *const i64;
            let b = b as *const i64;
            let chunks = n / 4;
            for c in 0..chunks {
                let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
                let va = _mm256_i32gather_epi64::<8>(a, idx);
                let vb = _mm256_i32gather_epi64::<8>(b, idx);
                _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, $vec(va, vb));
            }
            for i in chunks * 4..n {
                let idx = *sel.add(i) as usize;
                *out.add(i) = (*a.add(idx)).$m(*b.add(idx));
            }
            n
        }
    };
}

#[inline(always)]
unsafe fn add4(a: __m256i, b: __m256i) -> __m256i {
    _mm256_add_epi64(a, b)
}

#[inline(always)]
unsafe fn sub4(a: __m256i, b: __m256i) -> __m256i {
    _mm256_sub_epi64(a, b)
}

proj_avx2!(
    proj_plus_i64_col_col_avx2, proj_plus_cc_impl,
    proj_plus_i64_col_val_avx2, proj_plus_cv_impl,
    proj_sel_both_plus_i64_col_col_avx2, proj_plus_sb_impl,
    add4, wrapping_add
);
proj_avx2!(
    proj_minus_i64_col_col_avx2, proj_minus_cc_impl,
    proj_minus_i64_col_val_avx2, proj_minus_cv_impl,
    proj_sel_both_minus_i64_col_col_avx2, proj_minus_sb_impl,
    sub4, wrapping_sub
);
proj_avx2!(
    proj_multiplies_i64_col_col_avx2, proj_mul_cc_impl,
    proj_multiplies_i64_col_val_avx2, proj_mul_cv_impl,
    proj_sel_both_multiplies_i64_col_col_avx2, proj_mul_sb_impl,
    mullo_epi64, wrapping_mul
);

/// `out[i] = val - a[sel[i]]` with gathered reads.
pub unsafe fn proj_sel_minus_val_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
    p4: *mut c_void,
) -> usize {
    proj_minus_vc_impl(n, p1, p2, p3, p4)
}

#[target_feature(enable = "avx2")]
unsafe fn proj_minus_vc_impl(
    n: usize,
    sel: *mut c_void,
    out: *mut c_void,
    val: *mut c_void,
    a: *mut c_void,
) -> usize {
    let sel = sel as *const Pos;
    let out = out as *mut i64;
    let v = *(val as *const i64);
    let a = a as *const i64;
    let pivot = _mm256_set1_epi64x(v);
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let va = _mm256_i32gather_epi64::<8>(a, idx);
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, _mm256_sub_epi64(pivot, va));
    }
    for i in chunks * 4..n {
        *out.add(i) = v.wrapping_sub(*a.add(*sel.add(i) as usize));
    }
    n
}

/// `out[i] = a[sel[i]] + val` with gathered reads.
pub unsafe fn proj_sel_plus_i64_col_val_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
    p4: *mut c_void,
) -> usize {
    proj_sel_plus_cv_impl(n, p1, p2, p3, p4)
}

#[target_feature(enable = "avx2")]
unsafe fn proj_sel_plus_cv_impl(
    n: usize,
    sel: *mut c_void,
    out: *mut c_void,
    a: *mut c_void,
    val: *mut c_void,
) -> usize {
    let sel = sel as *const Pos;
    let out = out as *mut i64;
    let a = a as *const i64;
    let v = *(val as *const i64);
    let pivot = _mm256_set1_epi64x(v);
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let va = _mm256_i32gather_epi64::<8>(a, idx);
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, _mm256_add_epi64(va, pivot));
    }
    for i in chunks * 4..n {
        *out.add(i) = (*a.add(*sel.add(i) as usize)).wrapping_add(v);
    }
    n
}

/// `out[i] = col[sel[i]]` with gathered reads.
pub unsafe fn gather_sel_i64_col_avx2(
    n: usize,
    p1: *mut c_void,
    p2: *mut c_void,
    p3: *mut c_void,
) -> usize {
    gather_sel_i64_impl(n, p1, p2, p3)
}

#[target_feature(enable = "avx2")]
unsafe fn gather_sel_i64_impl(n: usize, out: *mut c_void, sel: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut i64;
    let sel = sel as *const Pos;
    let col = col as *const i64;
    let chunks = n / 4;
    for c in 0..chunks {
        let idx = _mm_loadu_si128(sel.add(c * 4) as *const __m128i);
        let v = _mm256_i32gather_epi64::<8>(col, idx);
        _mm256_storeu_si256(out.add(c * 4) as *mut __m256i, v);
    }
    for i in chunks * 4..n {
        *out.add(i) = *col.add(*sel.add(i) as usize);
    }
    n
}

// --- aggregation -----------------------------------------------------------

pub unsafe fn aggr_static_plus_i64_col_avx2(n: usize, p1: *mut c_void, p2: *mut c_void) -> usize {
    aggr_plus_impl(n, p1, p2)
}

#[target_feature(enable = "avx2")]
unsafe fn aggr_plus_impl(n: usize, acc: *mut c_void, col: *mut c_void) -> usize {
    let acc = acc as *mut i64;
    let col = col as *const i64;
    let mut vsum = _mm256_setzero_si256();
    let chunks = n / 4;
    for c in 0..chunks {
        let v = _mm256_loadu_si256(col.add(c * 4) as *const __m256i);
        vsum = _mm256_add_epi64(vsum, v);
    }
    let mut lanes = [0i64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, vsum);
    let mut sum = lanes[0]
        .wrapping_add(lanes[1])
        .wrapping_add(lanes[2])
        .wrapping_add(lanes[3]);
    for i in chunks * 4..n {
        sum = sum.wrapping_add(*col.add(i));
    }
    *acc = (*acc).wrapping_add(sum);
    n
}
