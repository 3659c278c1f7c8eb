// Per-query engine configuration and primitive lookup.
//
// The config decides, once at query build time, which implementation of
// each primitive family runs: the AVX2 kernel when the matching flag is on
// and the CPU supports it, the branch-free scalar kernel otherwise. The
// struct is immutable and passed down into operator construction; nothing
// here is global.

#[cfg(target_arch = "x86_64")]
use crate::simd::cpu_features;
use crate::vectorized::primitives::{aggregate, hash, project, select, F2, F3, F4};
use crate::vectorized::DEFAULT_VECTOR_SIZE;

#[cfg(target_arch = "x86_64")]
use crate::vectorized::primitives::avx2;

/// Probe algorithm for the hash join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAlgo {
    /// Per-row chain walk (joinAllParallel).
    Chained,
    /// Batched chain advance with compressed candidates (joinBoncz).
    Boncz,
    /// Gather-based wide probe (joinAllSIMD).
    Simd,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub use_simd_hash: bool,
    pub use_simd_proj: bool,
    pub use_simd_sel: bool,
    pub use_simd_join: bool,
    /// Force the Boncz probe; recognized from the `JoinBoncz=1` environment
    /// option.
    pub join_boncz: bool,
    pub vector_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let join_boncz = std::env::var("JoinBoncz")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .map(|v| v != 0)
            .unwrap_or(false);
        Self {
            use_simd_hash: true,
            use_simd_proj: true,
            use_simd_sel: true,
            use_simd_join: true,
            join_boncz,
            vector_size: DEFAULT_VECTOR_SIZE,
        }
    }
}

macro_rules! prim {
    ($name:ident, $ret:ty, $flag:ident, $scalar:expr, $avx2:path) => {
        pub fn $name(&self) -> $ret {
            #[cfg(target_arch = "x86_64")]
            if self.$flag && cpu_features().avx2 {
                return $avx2;
            }
            $scalar
        }
    };
}

impl EngineConfig {
    pub fn scalar_only(vector_size: usize) -> Self {
        Self {
            use_simd_hash: false,
            use_simd_proj: false,
            use_simd_sel: false,
            use_simd_join: false,
            join_boncz: false,
            vector_size,
        }
    }

    /// The probe algorithm all hash joins of this query use.
    pub fn join_algo(&self) -> JoinAlgo {
        #[cfg(target_arch = "x86_64")]
        if self.use_simd_join && cpu_features().avx2 {
            return JoinAlgo::Simd;
        }
        if self.join_boncz {
            JoinAlgo::Boncz
        } else {
            JoinAlgo::Chained
        }
    }

    // selection, i32
    prim!(sel_equal_i32_col_val, F3, use_simd_sel,
        select::sel_equal_col_val::<i32>, avx2::sel_equal_i32_col_val_avx2);
    prim!(sel_not_equal_i32_col_val, F3, use_simd_sel,
        select::sel_not_equal_col_val::<i32>, avx2::sel_not_equal_i32_col_val_avx2);
    prim!(sel_less_i32_col_val, F3, use_simd_sel,
        select::sel_less_col_val::<i32>, avx2::sel_less_i32_col_val_avx2);
    prim!(sel_less_equal_i32_col_val, F3, use_simd_sel,
        select::sel_less_equal_col_val::<i32>, avx2::sel_less_equal_i32_col_val_avx2);
    prim!(sel_greater_i32_col_val, F3, use_simd_sel,
        select::sel_greater_col_val::<i32>, avx2::sel_greater_i32_col_val_avx2);
    prim!(sel_greater_equal_i32_col_val, F3, use_simd_sel,
        select::sel_greater_equal_col_val::<i32>, avx2::sel_greater_equal_i32_col_val_avx2);

    prim!(selsel_equal_i32_col_val, F4, use_simd_sel,
        select::selsel_equal_col_val::<i32>, avx2::selsel_equal_i32_col_val_avx2);
    prim!(selsel_not_equal_i32_col_val, F4, use_simd_sel,
        select::selsel_not_equal_col_val::<i32>, avx2::selsel_not_equal_i32_col_val_avx2);
    prim!(selsel_less_i32_col_val, F4, use_simd_sel,
        select::selsel_less_col_val::<i32>, avx2::selsel_less_i32_col_val_avx2);
    prim!(selsel_less_equal_i32_col_val, F4, use_simd_sel,
        select::selsel_less_equal_col_val::<i32>, avx2::selsel_less_equal_i32_col_val_avx2);
    prim!(selsel_greater_i32_col_val, F4, use_simd_sel,
        select::selsel_greater_col_val::<i32>, avx2::selsel_greater_i32_col_val_avx2);
    prim!(selsel_greater_equal_i32_col_val, F4, use_simd_sel,
        select::selsel_greater_equal_col_val::<i32>, avx2::selsel_greater_equal_i32_col_val_avx2);

    // selection, i64
    prim!(sel_equal_i64_col_val, F3, use_simd_sel,
        select::sel_equal_col_val::<i64>, avx2::sel_equal_i64_col_val_avx2);
    prim!(sel_not_equal_i64_col_val, F3, use_simd_sel,
        select::sel_not_equal_col_val::<i64>, avx2::sel_not_equal_i64_col_val_avx2);
    prim!(sel_less_i64_col_val, F3, use_simd_sel,
        select::sel_less_col_val::<i64>, avx2::sel_less_i64_col_val_avx2);
    prim!(sel_less_equal_i64_col_val, F3, use_simd_sel,
        select::sel_less_equal_col_val::<i64>, avx2::sel_less_equal_i64_col_val_avx2);
    prim!(sel_greater_i64_col_val, F3, use_simd_sel,
        select::sel_greater_col_val::<i64>, avx2::sel_greater_i64_col_val_avx2);
    prim!(sel_greater_equal_i64_col_val, F3, use_simd_sel,
        select::sel_greater_equal_col_val::<i64>, avx2::sel_greater_equal_i64_col_val_avx2);

    prim!(selsel_equal_i64_col_val, F4, use_simd_sel,
        select::selsel_equal_col_val::<i64>, avx2::selsel_equal_i64_col_val_avx2);
    prim!(selsel_not_equal_i64_col_val, F4, use_simd_sel,
        select::selsel_not_equal_col_val::<i64>, avx2::selsel_not_equal_i64_col_val_avx2);
    prim!(selsel_less_i64_col_val, F4, use_simd_sel,
        select::selsel_less_col_val::<i64>, avx2::selsel_less_i64_col_val_avx2);
    prim!(selsel_less_equal_i64_col_val, F4, use_simd_sel,
        select::selsel_less_equal_col_val::<i64>, avx2::selsel_less_equal_i64_col_val_avx2);
    prim!(selsel_greater_i64_col_val, F4, use_simd_sel,
        select::selsel_greater_col_val::<i64>, avx2::selsel_greater_i64_col_val_avx2);
    prim!(selsel_greater_equal_i64_col_val, F4, use_simd_sel,
        select::selsel_greater_equal_col_val::<i64>, avx2::selsel_greater_equal_i64_col_val_avx2);

    // hashing
    prim!(hash_i32_col, F2, use_simd_hash, hash::hash_col::<i32>, avx2::hash_i32_col_avx2);
    prim!(hash_i64_col, F2, use_simd_hash, hash::hash_col::<i64>, avx2::hash_i64_col_avx2);
    prim!(rehash_i32_col, F2, use_simd_hash, hash::rehash_col::<i32>, avx2::rehash_i32_col_avx2);
    prim!(rehash_i64_col, F2, use_simd_hash, hash::rehash_col::<i64>, avx2::rehash_i64_col_avx2);
    prim!(hash_sel_i32_col, F3, use_simd_hash,
        hash::hash_sel_col::<i32>, avx2::hash_sel_i32_col_avx2);
    prim!(hash_sel_i64_col, F3, use_simd_hash,
        hash::hash_sel_col::<i64>, avx2::hash_sel_i64_col_avx2);
    prim!(rehash_sel_i32_col, F3, use_simd_hash,
        hash::rehash_sel_col::<i32>, avx2::rehash_sel_i32_col_avx2);
    prim!(rehash_sel_i64_col, F3, use_simd_hash,
        hash::rehash_sel_col::<i64>, avx2::rehash_sel_i64_col_avx2);

    // projection
    prim!(proj_plus_i64_col_col, F3, use_simd_proj,
        project::proj_plus_col_col, avx2::proj_plus_i64_col_col_avx2);
    prim!(proj_minus_i64_col_col, F3, use_simd_proj,
        project::proj_minus_col_col, avx2::proj_minus_i64_col_col_avx2);
    prim!(proj_multiplies_i64_col_col, F3, use_simd_proj,
        project::proj_multiplies_col_col, avx2::proj_multiplies_i64_col_col_avx2);
    prim!(proj_plus_i64_col_val, F3, use_simd_proj,
        project::proj_plus_col_val, avx2::proj_plus_i64_col_val_avx2);
    prim!(proj_minus_i64_col_val, F3, use_simd_proj,
        project::proj_minus_col_val, avx2::proj_minus_i64_col_val_avx2);
    prim!(proj_multiplies_i64_col_val, F3, use_simd_proj,
        project::proj_multiplies_col_val, avx2::proj_multiplies_i64_col_val_avx2);
    prim!(proj_sel_both_plus_i64_col_col, F4, use_simd_proj,
        project::proj_sel_both_plus_col_col, avx2::proj_sel_both_plus_i64_col_col_avx2);
    prim!(proj_sel_both_minus_i64_col_col, F4, use_simd_proj,
        project::proj_sel_both_minus_col_col, avx2::proj_sel_both_minus_i64_col_col_avx2);
    prim!(proj_sel_both_multiplies_i64_col_col, F4, use_simd_proj,
        project::proj_sel_both_multiplies_col_col, avx2::proj_sel_both_multiplies_i64_col_col_avx2);
    prim!(proj_sel_minus_i64_val_col, F4, use_simd_proj,
        project::proj_sel_minus_val_col, avx2::proj_sel_minus_val_col_avx2);
    prim!(proj_sel_plus_i64_col_val, F4, use_simd_proj,
        project::proj_sel_plus_col_val, avx2::proj_sel_plus_i64_col_val_avx2);
    prim!(gather_sel_i64_col, F3, use_simd_proj,
        project::gather_sel_i64_col, avx2::gather_sel_i64_col_avx2);

    // static aggregation
    prim!(aggr_static_plus_i64_col, F2, use_simd_proj,
        aggregate::aggr_static_plus_i64_col, avx2::aggr_static_plus_i64_col_avx2);
}
