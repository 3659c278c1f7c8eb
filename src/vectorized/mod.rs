// Vectorized execution engine.
//
// Queries are pipelines of pull-based operators exchanging batches of at
// most `vector_size` rows. Surviving rows are identified by selection
// vectors instead of being materialized, and all per-batch work is done by
// type-specialized primitives selected once at query build time.

pub mod config;
pub mod expression;
pub mod hash_group;
pub mod hash_join;
pub mod hash_table;
pub mod operators;
pub mod primitives;

pub use config::{EngineConfig, JoinAlgo};
pub use expression::{Access, BufPtr, ColumnCursor, Expression, Operand, QueryBuffers};
pub use hash_group::{Aggr, GroupShared, HashGroup};
pub use hash_join::{BuildSide, Hashjoin, JoinShared, ProbeSide};
pub use operators::{FixedAggregation, Operator, Project, Scan, Select};

/// In-batch row position. Selection vectors are arrays of these.
pub type Pos = u32;

/// Default batch size flowing between operators.
pub const DEFAULT_VECTOR_SIZE: usize = 1024;
