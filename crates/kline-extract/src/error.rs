//! Extraction error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Malformed checkpoint at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Checkpoint already exists at {0}")]
    AlreadyExists(String),

    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] kline_core::CoreError),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Checkpoint not initialized at {0}")]
    CheckpointNotInitialized(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Non-monotonic batch: max id {batch_max} is not above checkpoint {last_id}")]
    NonMonotonicBatch { last_id: u64, batch_max: u64 },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type ExtractResult<T> = Result<T, ExtractError>;
