// Columnar storage: cache-aligned typed column buffers, relations, the
// in-memory database catalog, and the TPC-H text importer.

pub mod column;
pub mod import;
pub mod relation;

pub use column::Column;
pub use import::import_tpch;
pub use relation::{Database, Relation};
