//! Layer builds used by the pipeline: bronze -> silver cleaning and
//! silver -> gold summaries.

use crate::aggregations::{summarize, AggFunc, Aggregation};
use crate::cleaning::{drop_duplicates, drop_nulls, Keep};
use crate::error::TransformResult;
use crate::transformation::{
    add_calendar_column, cast_columns, drop_columns, epoch_ms_to_timestamp, rename_by_position,
    sort_by, CalendarBucket,
};
use arrow::record_batch::RecordBatch;
use kline_core::columns::KLINE_TIME_COLUMNS;
use kline_core::{kline_column_names, kline_conversion_mapping, trade_conversion_mapping};
use tracing::info;

/// Partition column added to every silver table.
pub const DATE_COLUMN: &str = "date";
const MONTH_COLUMN: &str = "month";

/// Bronze positional klines -> typed silver klines keyed by `open_time`.
pub fn clean_klines(bronze: &RecordBatch) -> TransformResult<RecordBatch> {
    let batch = rename_by_position(bronze, &kline_column_names())?;
    let batch = drop_columns(&batch, &["ignore"])?;
    let batch = cast_columns(&batch, &kline_conversion_mapping())?;
    let batch = drop_nulls(&batch, &["open_time"])?;
    let batch = drop_duplicates(&batch, &["open_time"], Keep::First)?;
    let batch = epoch_ms_to_timestamp(&batch, &KLINE_TIME_COLUMNS)?;
    let batch = sort_by(&batch, "open_time", true)?;
    let silver = add_calendar_column(&batch, "open_time", DATE_COLUMN, CalendarBucket::Day)?;

    info!(
        input_rows = bronze.num_rows(),
        output_rows = silver.num_rows(),
        "Cleaned klines"
    );
    Ok(silver)
}

/// Bronze historical trades -> typed silver trades keyed by `id`.
pub fn clean_trades(bronze: &RecordBatch) -> TransformResult<RecordBatch> {
    let batch = cast_columns(bronze, &trade_conversion_mapping())?;
    let batch = drop_nulls(&batch, &["id"])?;
    let batch = drop_duplicates(&batch, &["id"], Keep::First)?;
    let batch = epoch_ms_to_timestamp(&batch, &["time"])?;
    let batch = sort_by(&batch, "id", true)?;
    let silver = add_calendar_column(&batch, "time", DATE_COLUMN, CalendarBucket::Day)?;

    info!(
        input_rows = bronze.num_rows(),
        output_rows = silver.num_rows(),
        "Cleaned trades"
    );
    Ok(silver)
}

/// Silver klines -> one row per calendar month.
pub fn monthly_kline_summary(silver: &RecordBatch) -> TransformResult<RecordBatch> {
    // Scans do not preserve row order across files
    let batch = sort_by(silver, "open_time", true)?;
    let batch = add_calendar_column(&batch, "open_time", MONTH_COLUMN, CalendarBucket::Month)?;
    let aggregations = [
        Aggregation::new("open_time", AggFunc::First).alias("month_open_time"),
        Aggregation::new("open", AggFunc::First),
        Aggregation::new("high", AggFunc::Max),
        Aggregation::new("low", AggFunc::Min),
        Aggregation::new("close", AggFunc::Last),
        Aggregation::new("volume", AggFunc::Sum).alias("total_volume"),
        Aggregation::new("quote_asset_volume", AggFunc::Sum),
        Aggregation::new("num_trades", AggFunc::Sum).alias("total_trades"),
        Aggregation::new("close", AggFunc::Mean).alias("avg_close"),
        Aggregation::new("open_time", AggFunc::Count).alias("days"),
    ];
    summarize(&batch, &[MONTH_COLUMN], &aggregations)
}

/// Silver trades -> one row per trade date.
pub fn daily_trade_summary(silver: &RecordBatch) -> TransformResult<RecordBatch> {
    let aggregations = [
        Aggregation::new("price", AggFunc::Mean).alias("avg_price"),
        Aggregation::new("qty", AggFunc::Sum).alias("total_qty"),
        Aggregation::new("id", AggFunc::Count).alias("count_id"),
    ];
    summarize(silver, &[DATE_COLUMN], &aggregations)
}
