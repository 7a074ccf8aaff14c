//! Group-and-aggregate with output renaming.

use crate::column;
use crate::error::{TransformError, TransformResult};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::row::{OwnedRow, RowConverter, Rows, SortField};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Aggregate function applied to one column per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    /// First non-null value in row order.
    First,
    /// Last non-null value in row order.
    Last,
    Min,
    Max,
    /// Int64 for integer columns, Float64 otherwise. Empty groups sum to zero.
    /// An Int64 overflow is an error.
    Sum,
    Mean,
    /// Non-null values.
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub column: String,
    pub func: AggFunc,
    /// Output column name. Defaults to the input column name.
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(column: impl Into<String>, func: AggFunc) -> Self {
        Self {
            column: column.into(),
            func,
            alias: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

/// Group `batch` by the `by` columns and apply `aggs`.
///
/// Output has one row per group, ordered by the group key, with the key
/// columns first followed by one column per aggregation.
pub fn summarize(
    batch: &RecordBatch,
    by: &[&str],
    aggs: &[Aggregation],
) -> TransformResult<RecordBatch> {
    let keys: Vec<ArrayRef> = by
        .iter()
        .map(|name| column(batch, name).cloned())
        .collect::<TransformResult<_>>()?;

    let groups = group_indices(&keys, batch.num_rows())?;
    let representatives = UInt32Array::from(groups.iter().map(|g| g[0]).collect::<Vec<_>>());

    let schema = batch.schema();
    let mut fields = Vec::with_capacity(by.len() + aggs.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(by.len() + aggs.len());
    for (name, key) in by.iter().zip(&keys) {
        let field = schema.field_with_name(name)?;
        fields.push(field.clone());
        columns.push(take(key.as_ref(), &representatives, None)?);
    }

    for agg in aggs {
        let values = column(batch, &agg.column)?;
        let output = aggregate(values, &groups, agg.func)?;
        fields.push(Field::new(
            agg.output_name(),
            output.data_type().clone(),
            true,
        ));
        columns.push(output);
    }

    debug!(
        groups = groups.len(),
        aggregations = aggs.len(),
        "Summarized batch"
    );
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Row indices per group in key order. Within a group indices stay ascending.
fn group_indices(keys: &[ArrayRef], num_rows: usize) -> TransformResult<Vec<Vec<u32>>> {
    if keys.is_empty() {
        return Ok(if num_rows == 0 {
            Vec::new()
        } else {
            vec![(0..num_rows as u32).collect()]
        });
    }

    let rows = convert(keys)?;
    let mut groups: BTreeMap<OwnedRow, Vec<u32>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups.entry(row.owned()).or_default().push(i as u32);
    }
    Ok(groups.into_values().collect())
}

fn convert(columns: &[ArrayRef]) -> TransformResult<Rows> {
    let converter = RowConverter::new(
        columns
            .iter()
            .map(|c| SortField::new(c.data_type().clone()))
            .collect(),
    )?;
    Ok(converter.convert_columns(columns)?)
}

fn aggregate(values: &ArrayRef, groups: &[Vec<u32>], func: AggFunc) -> TransformResult<ArrayRef> {
    match func {
        AggFunc::First => pick(values, groups, |group| {
            group.iter().copied().find(|&i| values.is_valid(i as usize))
        }),
        AggFunc::Last => pick(values, groups, |group| {
            group.iter().rev().copied().find(|&i| values.is_valid(i as usize))
        }),
        AggFunc::Min | AggFunc::Max => {
            let rows = convert(std::slice::from_ref(values))?;
            let want_max = func == AggFunc::Max;
            pick(values, groups, |group| {
                group
                    .iter()
                    .copied()
                    .filter(|&i| values.is_valid(i as usize))
                    .reduce(|best, i| {
                        let ordering = rows.row(i as usize).cmp(&rows.row(best as usize));
                        let better = if want_max {
                            ordering.is_gt()
                        } else {
                            ordering.is_lt()
                        };
                        if better {
                            i
                        } else {
                            best
                        }
                    })
            })
        }
        AggFunc::Sum => sum(values, groups),
        AggFunc::Mean => {
            let floats = as_float64(values, "mean")?;
            let means: Float64Array = groups
                .iter()
                .map(|group| {
                    let (total, n) = group
                        .iter()
                        .filter(|&&i| floats.is_valid(i as usize))
                        .fold((0.0, 0usize), |(t, n), &i| (t + floats.value(i as usize), n + 1));
                    (n > 0).then(|| total / n as f64)
                })
                .collect();
            Ok(Arc::new(means))
        }
        AggFunc::Count => {
            let counts: Int64Array = groups
                .iter()
                .map(|group| {
                    Some(
                        group
                            .iter()
                            .filter(|&&i| values.is_valid(i as usize))
                            .count() as i64,
                    )
                })
                .collect();
            Ok(Arc::new(counts))
        }
    }
}

/// Take one row per group chosen by `select`. A group with no valid row yields null.
fn pick<F>(values: &ArrayRef, groups: &[Vec<u32>], select: F) -> TransformResult<ArrayRef>
where
    F: Fn(&[u32]) -> Option<u32>,
{
    let indices: UInt32Array = groups.iter().map(|g| select(g)).collect();
    Ok(take(values.as_ref(), &indices, None)?)
}

fn sum(values: &ArrayRef, groups: &[Vec<u32>]) -> TransformResult<ArrayRef> {
    if values.data_type().is_integer() {
        let ints = cast(values, &DataType::Int64)?;
        let ints = ints
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| unsupported("sum", values.data_type()))?;
        let totals = groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .filter(|&&i| ints.is_valid(i as usize))
                    .try_fold(0i64, |acc, &i| acc.checked_add(ints.value(i as usize)))
                    .map(Some)
                    .ok_or_else(|| {
                        ArrowError::ArithmeticOverflow("Int64 sum overflowed".to_string())
                    })
            })
            .collect::<Result<Int64Array, ArrowError>>()?;
        return Ok(Arc::new(totals));
    }

    let floats = as_float64(values, "sum")?;
    let totals: Float64Array = groups
        .iter()
        .map(|group| {
            Some(
                group
                    .iter()
                    .filter(|&&i| floats.is_valid(i as usize))
                    .map(|&i| floats.value(i as usize))
                    .sum::<f64>(),
            )
        })
        .collect();
    Ok(Arc::new(totals))
}

fn as_float64(values: &ArrayRef, operation: &'static str) -> TransformResult<Float64Array> {
    if !values.data_type().is_numeric() {
        return Err(unsupported(operation, values.data_type()));
    }
    let floats = cast(values, &DataType::Float64)?;
    floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| unsupported(operation, values.data_type()))
}

fn unsupported(operation: &'static str, data_type: &DataType) -> TransformError {
    TransformError::UnsupportedType {
        operation,
        data_type: data_type.to_string(),
    }
}
