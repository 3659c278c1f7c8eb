// Bulk hash kernels. `hash_*` seeds a fresh hash per row; `rehash_*` folds
// another key column into an existing hash column, so multi-column keys
// hash as hash(k0) then rehash(k1), rehash(k2), ...

use std::ffi::c_void;

use crate::types::{hash_bits, rehash_bits};
use crate::vectorized::primitives::ToBits;
use crate::vectorized::Pos;

/// `out[i] = hash(col[i])` for a dense column.
///
/// # Safety
/// `col` must hold `n` elements and `out` room for `n` hashes.
pub unsafe fn hash_col<T: ToBits>(n: usize, out: *mut c_void, col: *mut c_void) -> usize {
    let out = out as *mut u64;
    let col = col as *const T;
    for i in 0..n {
        *out.add(i) = hash_bits((*col.add(i)).to_bits());
    }
    n
}

/// `hashes[i] = combine(hashes[i], col[i])` for a dense column.
///
/// # Safety
/// `hashes` must hold `n` hashes and `col` `n` elements.
pub unsafe fn rehash_col<T: ToBits>(n: usize, hashes: *mut c_void, col: *mut c_void) -> usize {
    let hashes = hashes as *mut u64;
    let col = col as *const T;
    for i in 0..n {
        *hashes.add(i) = rehash_bits(*hashes.add(i), (*col.add(i)).to_bits());
    }
    n
}

/// `out[i] = hash(col[sel[i]])`; output is dense, one hash per selected row.
///
/// # Safety
/// `sel` must hold `n` in-range positions.
pub unsafe fn hash_sel_col<T: ToBits>(
    n: usize,
    out: *mut c_void,
    sel: *mut c_void,
    col: *mut c_void,
) -> usize {
    let out = out as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const T;
    for i in 0..n {
        *out.add(i) = hash_bits((*col.add(*sel.add(i) as usize)).to_bits());
    }
    n
}

/// `hashes[i] = combine(hashes[i], col[sel[i]])`; the hash column is dense.
///
/// # Safety
/// `sel` must hold `n` in-range positions.
pub unsafe fn rehash_sel_col<T: ToBits>(
    n: usize,
    hashes: *mut c_void,
    sel: *mut c_void,
    col: *mut c_void,
) -> usize {
    let hashes = hashes as *mut u64;
    let sel = sel as *const Pos;
    let col = col as *const T;
    for i in 0..n {
        *hashes.add(i) =
            rehash_bits(*hashes.add(i), (*col.add(*sel.add(i) as usize)).to_bits());
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Integer;
    use crate::types::Scalar;

    #[test]
    fn bulk_hash_matches_scalar_hash() {
        let col: Vec<i32> = vec![1, -1, 42, i32::MAX, i32::MIN];
        let mut out = vec![0u64; col.len()];
        unsafe {
            hash_col::<i32>(col.len(), out.as_mut_ptr() as *mut _, col.as_ptr() as *mut _);
        }
        for (i, &v) in col.iter().enumerate() {
            assert_eq!(out[i], Integer::new(v).hash());
        }
    }

    #[test]
    fn rehash_composes_on_top() {
        let k0: Vec<i32> = vec![1, 2];
        let k1: Vec<i64> = vec![100, 200];
        let mut h = vec![0u64; 2];
        unsafe {
            hash_col::<i32>(2, h.as_mut_ptr() as *mut _, k0.as_ptr() as *mut _);
            rehash_col::<i64>(2, h.as_mut_ptr() as *mut _, k1.as_ptr() as *mut _);
        }
        assert_eq!(h[0], rehash_bits(hash_bits(1), 100));
        assert_ne!(h[0], h[1]);
    }

    #[test]
    fn sel_variants_pick_rows() {
        let col: Vec<i32> = vec![10, 20, 30, 40];
        let sel: Vec<Pos> = vec![1, 3];
        let mut out = vec![0u64; 2];
        unsafe {
            hash_sel_col::<i32>(
                2,
                out.as_mut_ptr() as *mut _,
                sel.as_ptr() as *mut _,
                col.as_ptr() as *mut _,
            );
        }
        assert_eq!(out[0], hash_bits(20));
        assert_eq!(out[1], hash_bits(40));
    }
}
