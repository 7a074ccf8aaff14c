//! Extraction from the Binance REST API.
//!
//! - [`client`]: reqwest client for klines and historical trades
//! - [`loader`]: JSON payloads to Arrow batches
//! - [`checkpoint`]: `previous_id` / `last_id` progress file
//! - [`incremental`]: fetch cycles that advance the checkpoint only on commit

pub mod checkpoint;
pub mod client;
pub mod error;
pub mod incremental;
pub mod loader;
pub mod record;
pub mod source;

pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use client::{BinanceClient, HistoricalTrades, KlineRequest};
pub use error::{CheckpointError, CheckpointResult, ExtractError, ExtractResult};
pub use incremental::{mark_promoted, require, FetchOutcome, IncrementalFetcher, PendingCycle};
pub use loader::{kline_bronze_schema, klines_to_batch, records_to_batch};
pub use record::{max_id, Record};
pub use source::{BoxFuture, MockTradeSource, TradeSource};
