//! Core domain types for the K-line ETL pipeline.
//!
//! This crate provides the vocabulary shared by every stage:
//! - `columns`: Binance kline column layout and silver type mapping
//! - `layer`: Bronze/Silver/Gold layers and the datasets stored in them
//! - `time`: epoch-millisecond parsing and calendar bucketing
//! - `fs`: atomic file replacement helpers

pub mod columns;
pub mod error;
pub mod fs;
pub mod layer;
pub mod time;

pub use columns::{
    kline_column_names, kline_conversion_mapping, trade_conversion_mapping, KLINE_COLUMN_COUNT,
};
pub use error::{CoreError, Result};
pub use layer::{Dataset, Layer};
