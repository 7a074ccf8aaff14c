//! K-line medallion pipeline.
//!
//! - `full`: klines for a configured window -> bronze, silver, gold
//! - `incremental`: historical trades after the checkpoint -> bronze, then promote
//! - `promote`: bronze trades newer than `previous_id` -> silver, gold

pub mod app;
pub mod config;
pub mod error;

pub use app::Pipeline;
pub use config::PipelineConfig;
pub use error::{AppError, AppResult};
