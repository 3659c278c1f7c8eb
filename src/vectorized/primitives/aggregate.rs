// Static aggregation kernels: fold a batch into a caller-owned scalar
// accumulator bound as a Value operand. The backing storage is an
// UnsafeCell field in the query's const block.

use std::ffi::c_void;

use crate::vectorized::Pos;

/// `*acc += sum(col[0..n])`.
///
/// # Safety
/// `acc` must point at a writable i64, `col` must hold `n` i64 elements.
pub unsafe fn aggr_static_plus_i64_col(n: usize, acc: *mut c_void, col: *mut c_void) -> usize {
    let acc = acc as *mut i64;
    let col = col as *const i64;
    let mut sum = 0i64;
    for i in 0..n {
        sum = sum.wrapping_add(*col.add(i));
    }
    *acc = (*acc).wrapping_add(sum);
    n
}

/// `*acc += n`: row counting.
///
/// # Safety
/// `acc` must point at a writable i64.
pub unsafe fn aggr_static_count(n: usize, acc: *mut c_void, _col: *mut c_void) -> usize {
    let acc = acc as *mut i64;
    *acc += n as i64;
    n
}

/// `*acc += sum(col[sel[i]])` over the selection vector.
///
/// # Safety
/// `sel` must hold `n` in-range positions.
pub unsafe fn aggr_static_plus_sel_i64_col(
    n: usize,
    acc: *mut c_void,
    sel: *mut c_void,
    col: *mut c_void,
) -> usize {
    let acc = acc as *mut i64;
    let sel = sel as *const Pos;
    let col = col as *const i64;
    let mut sum = 0i64;
    for i in 0..n {
        sum = sum.wrapping_add(*col.add(*sel.add(i) as usize));
    }
    *acc = (*acc).wrapping_add(sum);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_sum_accumulates_across_batches() {
        let batch1: Vec<i64> = vec![1, 2, 3];
        let batch2: Vec<i64> = vec![10];
        let mut acc = 0i64;
        unsafe {
            aggr_static_plus_i64_col(3, &mut acc as *mut i64 as *mut _, batch1.as_ptr() as *mut _);
            aggr_static_plus_i64_col(1, &mut acc as *mut i64 as *mut _, batch2.as_ptr() as *mut _);
        }
        assert_eq!(acc, 16);
    }

    #[test]
    fn sel_sum_reads_through() {
        let col: Vec<i64> = vec![5, 6, 7];
        let sel: Vec<Pos> = vec![0, 2];
        let mut acc = 0i64;
        unsafe {
            aggr_static_plus_sel_i64_col(
                2,
                &mut acc as *mut i64 as *mut _,
                sel.as_ptr() as *mut _,
                col.as_ptr() as *mut _,
            );
        }
        assert_eq!(acc, 12);
    }

    #[test]
    fn count_counts() {
        let mut acc = 0i64;
        unsafe {
            aggr_static_count(7, &mut acc as *mut i64 as *mut _, std::ptr::null_mut());
        }
        assert_eq!(acc, 7);
    }
}
