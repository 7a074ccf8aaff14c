//! Tabular transforms over Arrow record batches.
//!
//! Every helper takes a batch by reference and returns a new batch, so a
//! silver or gold build is a plain chain of fallible calls.

pub mod aggregations;
pub mod cleaning;
pub mod error;
pub mod presets;
pub mod profiling;
pub mod transformation;

pub use aggregations::{summarize, AggFunc, Aggregation};
pub use cleaning::{count_nulls, drop_duplicates, drop_nulls, impute_nulls, FillValue, Keep};
pub use error::{TransformError, TransformResult};
pub use presets::{clean_klines, clean_trades, daily_trade_summary, monthly_kline_summary};
pub use profiling::{profile, ColumnProfile, ProfileReport};
pub use transformation::{
    add_calendar_column, cast_columns, drop_columns, epoch_ms_to_timestamp, move_column,
    rename_by_name, rename_by_position, sort_by, CalendarBucket,
};

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> TransformResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TransformError::ColumnNotFound(name.to_string()))
}
