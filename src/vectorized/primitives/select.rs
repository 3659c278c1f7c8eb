// Selection kernels. `sel_*` filters a dense column against a constant and
// emits the qualifying positions; `selsel_*` reads only the positions of an
// input selection vector and writes the kept ones. Both are branch-free:
// the position is stored unconditionally and the write cursor advances by
// the comparison result.

use std::ffi::c_void;

use crate::vectorized::Pos;

macro_rules! sel_family {
    ($dense:ident, $refine:ident, $op:tt) => {
        /// Dense filter: `sel_out[k++] = i` for rows where `col[i]` passes.
        ///
        /// # Safety
        /// `col` must hold `n` elements, `sel_out` must have room for `n`
        /// positions and `val` must point at a `T`.
        pub unsafe fn $dense<T: Copy + PartialOrd>(
            n: usize,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let out = sel_out as *mut Pos;
            let col = col as *const T;
            let val = *(val as *const T);
            let mut k = 0usize;
            for i in 0..n {
                *out.add(k) = i as Pos;
                k += (*col.add(i) $op val) as usize;
            }
            k
        }

        /// Sel-vec refinement: keep positions of `sel_in` whose column value
        /// passes.
        ///
        /// # Safety
        /// `sel_in` must hold `n` in-range positions, `sel_out` room for `n`.
        pub unsafe fn $refine<T: Copy + PartialOrd>(
            n: usize,
            sel_in: *mut c_void,
            sel_out: *mut c_void,
            col: *mut c_void,
            val: *mut c_void,
        ) -> usize {
            let sel_in = sel_in as *const Pos;
            let out = sel_out as *mut Pos;
            let col = col as *const T;
            let val = *(val as *const T);
            let mut k = 0usize;
            for i in 0..n {
                let idx = *sel_in.add(i);
                *out.add(k) = idx;
                k += (*col.add(idx as usize) $op val) as usize;
            }
            k
        }
    };
}

sel_family!(sel_equal_col_val, selsel_equal_col_val, ==);
sel_family!(sel_not_equal_col_val, selsel_not_equal_col_val, !=);
sel_family!(sel_less_col_val, selsel_less_col_val, <);
sel_family!(sel_less_equal_col_val, selsel_less_equal_col_val, <=);
sel_family!(sel_greater_col_val, selsel_greater_col_val, >);
sel_family!(sel_greater_equal_col_val, selsel_greater_equal_col_val, >=);
