//! Column-level transformations: renaming, casting, ordering.

use crate::column;
use crate::error::{TransformError, TransformResult};
use arrow::array::{Array, ArrayRef, StringBuilder};
use arrow::compute::{cast, cast_with_options, sort_to_indices, take_record_batch, CastOptions, SortOptions};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use kline_core::time::{date_bucket, month_bucket};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Calendar granularity for derived bucket columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarBucket {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM`
    Month,
}

fn rebuild(fields: Vec<Field>, columns: Vec<ArrayRef>) -> TransformResult<RecordBatch> {
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Sort rows by one column. Nulls go last.
pub fn sort_by(batch: &RecordBatch, by: &str, ascending: bool) -> TransformResult<RecordBatch> {
    let options = SortOptions {
        descending: !ascending,
        nulls_first: false,
    };
    let indices = sort_to_indices(column(batch, by)?.as_ref(), Some(options), None)?;
    Ok(take_record_batch(batch, &indices)?)
}

/// Rename columns by position. Positions not in `names` keep their name.
pub fn rename_by_position(
    batch: &RecordBatch,
    names: &BTreeMap<usize, String>,
) -> TransformResult<RecordBatch> {
    let width = batch.num_columns();
    if let Some((&position, _)) = names.iter().find(|(&p, _)| p >= width) {
        return Err(TransformError::PositionOutOfRange {
            position,
            columns: width,
        });
    }

    let fields = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| match names.get(&i) {
            Some(name) => f.as_ref().clone().with_name(name),
            None => f.as_ref().clone(),
        })
        .collect();
    rebuild(fields, batch.columns().to_vec())
}

/// Rename columns by current name. Every key must name an existing column.
pub fn rename_by_name(
    batch: &RecordBatch,
    names: &BTreeMap<String, String>,
) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    for old in names.keys() {
        if schema.index_of(old).is_err() {
            return Err(TransformError::ColumnNotFound(old.clone()));
        }
    }

    let fields = schema
        .fields()
        .iter()
        .map(|f| match names.get(f.name()) {
            Some(name) => f.as_ref().clone().with_name(name),
            None => f.as_ref().clone(),
        })
        .collect();
    rebuild(fields, batch.columns().to_vec())
}

/// Remove the named columns.
pub fn drop_columns(batch: &RecordBatch, drop: &[&str]) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    for name in drop {
        if schema.index_of(name).is_err() {
            return Err(TransformError::ColumnNotFound((*name).to_string()));
        }
    }

    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !drop.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    Ok(batch.project(&keep)?)
}

/// Cast columns to the mapped types. A value that cannot be converted is an
/// error rather than a silent null.
pub fn cast_columns(
    batch: &RecordBatch,
    mapping: &BTreeMap<String, DataType>,
) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    for name in mapping.keys() {
        if schema.index_of(name).is_err() {
            return Err(TransformError::ColumnNotFound(name.clone()));
        }
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        match mapping.get(field.name()) {
            Some(target) if target != array.data_type() => {
                let casted = cast_with_options(array, target, &options).map_err(|e| {
                    TransformError::InvalidCast {
                        column: field.name().clone(),
                        reason: e.to_string(),
                    }
                })?;
                fields.push(field.as_ref().clone().with_data_type(target.clone()));
                columns.push(casted);
            }
            _ => {
                fields.push(field.as_ref().clone());
                columns.push(array.clone());
            }
        }
    }
    rebuild(fields, columns)
}

/// Convert epoch-millisecond columns into millisecond timestamps.
///
/// Values that are not integers become null.
pub fn epoch_ms_to_timestamp(batch: &RecordBatch, columns: &[&str]) -> TransformResult<RecordBatch> {
    let target = DataType::Timestamp(TimeUnit::Millisecond, None);
    let mut mapping = BTreeMap::new();
    let mut prepared = batch.clone();

    for name in columns {
        let array = column(&prepared, name)?;
        if matches!(array.data_type(), DataType::Timestamp(TimeUnit::Millisecond, None)) {
            continue;
        }
        if array.data_type() != &DataType::Int64 {
            // Coerce strings and narrower ints to Int64 first, invalid -> null
            let as_int = cast(array, &DataType::Int64)?;
            prepared = replace_column(&prepared, name, as_int)?;
        }
        mapping.insert((*name).to_string(), target.clone());
    }

    cast_columns(&prepared, &mapping)
}

/// Move `column` to the position currently held by `to_position_of`.
pub fn move_column(
    batch: &RecordBatch,
    column_name: &str,
    to_position_of: &str,
) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    let from = schema
        .index_of(column_name)
        .map_err(|_| TransformError::ColumnNotFound(column_name.to_string()))?;
    let to = schema
        .index_of(to_position_of)
        .map_err(|_| TransformError::ColumnNotFound(to_position_of.to_string()))?;

    let mut order: Vec<usize> = (0..batch.num_columns()).collect();
    let moved = order.remove(from);
    order.insert(to, moved);
    Ok(batch.project(&order)?)
}

/// Append a `Utf8` column with the calendar bucket of a timestamp column.
///
/// `source` may be a millisecond timestamp or an epoch-ms integer column.
pub fn add_calendar_column(
    batch: &RecordBatch,
    source: &str,
    name: &str,
    bucket: CalendarBucket,
) -> TransformResult<RecordBatch> {
    let array = column(batch, source)?;
    let millis = match array.data_type() {
        DataType::Timestamp(TimeUnit::Millisecond, _) | DataType::Int64 | DataType::Int32 => {
            cast(array, &DataType::Int64)?
        }
        DataType::Timestamp(_, _) => {
            // Normalise to millisecond resolution before reading raw values
            let normalised = cast(array, &DataType::Timestamp(TimeUnit::Millisecond, None))?;
            cast(&normalised, &DataType::Int64)?
        }
        other => {
            return Err(TransformError::UnsupportedType {
                operation: "calendar bucket",
                data_type: other.to_string(),
            })
        }
    };

    let millis = millis
        .as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .ok_or_else(|| TransformError::UnsupportedType {
            operation: "calendar bucket",
            data_type: millis.data_type().to_string(),
        })?;

    let mut builder = StringBuilder::with_capacity(millis.len(), millis.len() * 10);
    for value in millis.iter() {
        match value {
            Some(ms) => {
                let label = match bucket {
                    CalendarBucket::Day => date_bucket(ms)?,
                    CalendarBucket::Month => month_bucket(ms)?,
                };
                builder.append_value(label);
            }
            None => builder.append_null(),
        }
    }

    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns = batch.columns().to_vec();
    fields.push(Field::new(name, DataType::Utf8, true));
    columns.push(Arc::new(builder.finish()));
    rebuild(fields, columns)
}

fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    let index = schema
        .index_of(name)
        .map_err(|_| TransformError::ColumnNotFound(name.to_string()))?;
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = batch.columns().to_vec();
    fields[index] = fields[index].clone().with_data_type(array.data_type().clone());
    columns[index] = array;
    rebuild(fields, columns)
}
