//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extract error: {0}")]
    Extract(#[from] kline_extract::ExtractError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] kline_extract::CheckpointError),

    #[error("Store error: {0}")]
    Store(#[from] kline_store::StoreError),

    #[error("Transform error: {0}")]
    Transform(#[from] kline_transform::TransformError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] kline_telemetry::TelemetryError),

    #[error("Core error: {0}")]
    Core(#[from] kline_core::CoreError),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
