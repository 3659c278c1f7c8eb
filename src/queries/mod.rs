// TPC-H query implementations, one module per query. Each query ships both
// strategies over the same database: a fused tuple-at-a-time loop reduced
// with rayon, and a vectorized operator pipeline run by a worker group.

use std::ffi::c_void;

pub mod q1;
pub mod q3;
pub mod q6;

pub use q1::{q1_compiled, q1_vectorized};
pub use q3::{q3_compiled, q3_vectorized};
pub use q6::{q6_compiled, q6_vectorized};

/// Size of a selection-vector element.
pub(crate) const POS_SIZE: usize = std::mem::size_of::<crate::vectorized::Pos>();

/// Bind a constant from a query's const block as a Value operand.
pub(crate) fn val<T>(v: &T) -> crate::vectorized::Operand {
    crate::vectorized::Operand::Value(v as *const T as *const c_void)
}
