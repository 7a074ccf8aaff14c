//! Versioned table storage for the bronze, silver and gold layers.
//!
//! A table is a directory of Parquet data files plus a JSON commit log.
//! Writes are published atomically as new versions; merges insert only rows
//! whose key is not already present, which makes re-running a batch safe.

pub mod error;
pub mod log;
pub mod predicate;
pub mod schema;
pub mod table;
pub mod writer;

pub use error::{StoreError, StoreResult};
pub use log::{Action, Commit, DataFile, Operation, TableLog, TableSnapshot, WriteMode};
pub use predicate::{KeyPair, MergePredicate};
pub use schema::{ColumnType, TableColumn, TableSchema};
pub use table::{ColumnFilter, Comparison, VersionedTable};
pub use writer::{TableWriter, WriteReport, NULL_PARTITION};
