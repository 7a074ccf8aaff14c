//! Table store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Invalid merge predicate '{predicate}': {reason}")]
    InvalidPredicate { predicate: String, reason: String },

    #[error("Corrupt table log: {0}")]
    CorruptLog(String),

    #[error("Version {version} was committed by another writer")]
    ConcurrentCommit { version: u64 },

    #[error("Unsupported column type: {0}")]
    UnsupportedType(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid write mode: {0}")]
    InvalidWriteMode(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StoreError::StorageUnavailable {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<kline_core::CoreError> for StoreError {
    fn from(err: kline_core::CoreError) -> Self {
        match err {
            kline_core::CoreError::Io { path, source } => {
                StoreError::StorageUnavailable { path, source }
            }
            other => StoreError::CorruptLog(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
