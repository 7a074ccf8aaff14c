//! Column layout for Binance `api/v3/klines` and the silver type mapping.
//!
//! A kline arrives as a 12-element JSON array. Bronze keeps the positional
//! layout; silver renames by position and casts with the mappings below.

use arrow::datatypes::DataType;
use std::collections::BTreeMap;

/// Number of positional fields in a Binance kline array.
pub const KLINE_COLUMN_COUNT: usize = 12;

/// Position -> column name for a kline array.
const KLINE_COLUMNS: [(usize, &str); KLINE_COLUMN_COUNT] = [
    (0, "open_time"),
    (1, "open"),
    (2, "high"),
    (3, "low"),
    (4, "close"),
    (5, "volume"),
    (6, "close_time"),
    (7, "quote_asset_volume"),
    (8, "num_trades"),
    (9, "tb_base_asset_volume"),
    (10, "tb_quote_asset_volume"),
    (11, "ignore"),
];

/// Positions that hold integers in the raw kline array. All others are strings.
pub const KLINE_INTEGER_POSITIONS: [usize; 3] = [0, 6, 8];

/// Epoch-millisecond columns of the silver kline table.
pub const KLINE_TIME_COLUMNS: [&str; 2] = ["open_time", "close_time"];

/// Position -> name mapping used to rename the bronze kline table.
pub fn kline_column_names() -> BTreeMap<usize, String> {
    KLINE_COLUMNS
        .iter()
        .map(|(pos, name)| (*pos, (*name).to_string()))
        .collect()
}

/// Column name -> target type for silver klines.
pub fn kline_conversion_mapping() -> BTreeMap<String, DataType> {
    [
        ("open", DataType::Float32),
        ("high", DataType::Float32),
        ("low", DataType::Float32),
        ("close", DataType::Float32),
        ("volume", DataType::Float32),
        ("quote_asset_volume", DataType::Float64),
        ("num_trades", DataType::Int32),
        ("tb_base_asset_volume", DataType::Float32),
        ("tb_quote_asset_volume", DataType::Float64),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect()
}

/// Column name -> target type for silver historical trades.
pub fn trade_conversion_mapping() -> BTreeMap<String, DataType> {
    [
        ("price", DataType::Float64),
        ("qty", DataType::Float64),
        ("quoteQty", DataType::Float64),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect()
}
