//! Transform error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column position {position} out of range for {columns} columns")]
    PositionOutOfRange { position: usize, columns: usize },

    #[error("Cannot cast column '{column}': {reason}")]
    InvalidCast { column: String, reason: String },

    #[error("Unsupported column type for {operation}: {data_type}")]
    UnsupportedType {
        operation: &'static str,
        data_type: String,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Core error: {0}")]
    Core(#[from] kline_core::CoreError),
}

pub type TransformResult<T> = Result<T, TransformError>;
