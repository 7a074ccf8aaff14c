//! Row-level cleaning: duplicates and nulls.

use crate::column;
use crate::error::{TransformError, TransformResult};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, Scalar, StringArray,
};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{and, cast, filter_record_batch, is_not_null};
use arrow::record_batch::RecordBatch;
use arrow::row::{OwnedRow, RowConverter, SortField};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Which row of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keep {
    #[default]
    First,
    Last,
}

/// Value used to replace nulls in a column.
#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl FillValue {
    fn to_array(&self) -> ArrayRef {
        match self {
            FillValue::Int(v) => Arc::new(Int64Array::from(vec![*v])),
            FillValue::Float(v) => Arc::new(Float64Array::from(vec![*v])),
            FillValue::Text(v) => Arc::new(StringArray::from(vec![v.as_str()])),
            FillValue::Bool(v) => Arc::new(BooleanArray::from(vec![*v])),
        }
    }
}

/// Drop rows that repeat the values of `subset` (all columns when empty).
pub fn drop_duplicates(batch: &RecordBatch, subset: &[&str], keep: Keep) -> TransformResult<RecordBatch> {
    let columns: Vec<ArrayRef> = if subset.is_empty() {
        batch.columns().to_vec()
    } else {
        subset
            .iter()
            .map(|name| column(batch, name).cloned())
            .collect::<TransformResult<_>>()?
    };

    let converter = RowConverter::new(
        columns
            .iter()
            .map(|c| SortField::new(c.data_type().clone()))
            .collect(),
    )?;
    let rows = converter.convert_columns(&columns)?;

    let mut seen: HashSet<OwnedRow> = HashSet::with_capacity(rows.num_rows());
    let mut mask = vec![false; rows.num_rows()];
    match keep {
        Keep::First => {
            for (i, row) in rows.iter().enumerate() {
                mask[i] = seen.insert(row.owned());
            }
        }
        Keep::Last => {
            for i in (0..rows.num_rows()).rev() {
                mask[i] = seen.insert(rows.row(i).owned());
            }
        }
    }

    let result = filter_record_batch(batch, &BooleanArray::from(mask))?;
    debug!(
        removed = batch.num_rows() - result.num_rows(),
        "Dropped duplicate rows"
    );
    Ok(result)
}

/// Drop rows holding a null in any of the `subset` columns.
pub fn drop_nulls(batch: &RecordBatch, subset: &[&str]) -> TransformResult<RecordBatch> {
    let mut mask = BooleanArray::from(vec![true; batch.num_rows()]);
    for name in subset {
        mask = and(&mask, &is_not_null(column(batch, name)?.as_ref())?)?;
    }
    let result = filter_record_batch(batch, &mask)?;
    debug!(
        removed = batch.num_rows() - result.num_rows(),
        "Dropped rows with nulls"
    );
    Ok(result)
}

/// Replace nulls per column. The fill value is cast to the column's type.
pub fn impute_nulls(
    batch: &RecordBatch,
    mapping: &BTreeMap<String, FillValue>,
) -> TransformResult<RecordBatch> {
    let schema = batch.schema();
    let mut columns = batch.columns().to_vec();

    for (name, value) in mapping {
        let index = schema
            .index_of(name)
            .map_err(|_| TransformError::ColumnNotFound(name.clone()))?;
        let current = &columns[index];
        if current.null_count() == 0 {
            continue;
        }

        let fill = cast(&value.to_array(), current.data_type()).map_err(|e| {
            TransformError::InvalidCast {
                column: name.clone(),
                reason: e.to_string(),
            }
        })?;
        if fill.is_null(0) {
            return Err(TransformError::InvalidCast {
                column: name.clone(),
                reason: format!("fill value {value:?} is not representable"),
            });
        }

        let present = is_not_null(current.as_ref())?;
        let filled = zip(&present, current, &Scalar::new(fill))?;
        columns[index] = filled;
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Null count per requested column.
pub fn count_nulls(batch: &RecordBatch, subset: &[&str]) -> TransformResult<BTreeMap<String, usize>> {
    subset
        .iter()
        .map(|name| Ok(((*name).to_string(), column(batch, name)?.null_count())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};

    fn sample() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("open_time", DataType::Int64, true),
            Field::new("close", DataType::Float64, true),
            Field::new("tag", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(1), None])),
                Arc::new(Float64Array::from(vec![Some(10.0), None, Some(11.0), Some(12.0)])),
                Arc::new(StringArray::from(vec![Some("a"), Some("b"), Some("a"), None])),
            ],
        )
        .unwrap()
    }

    fn floats(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn test_drop_duplicates_keep_first() {
        let out = drop_duplicates(&sample(), &["open_time"], Keep::First).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(floats(&out, "close"), vec![Some(10.0), None, Some(12.0)]);
    }

    #[test]
    fn test_drop_duplicates_keep_last() {
        let out = drop_duplicates(&sample(), &["open_time"], Keep::Last).unwrap();
        assert_eq!(floats(&out, "close"), vec![None, Some(11.0), Some(12.0)]);
    }

    #[test]
    fn test_drop_duplicates_all_columns() {
        // No two rows are identical across every column
        let out = drop_duplicates(&sample(), &[], Keep::First).unwrap();
        assert_eq!(out.num_rows(), 4);
    }

    #[test]
    fn test_drop_nulls_subset() {
        let out = drop_nulls(&sample(), &["open_time", "close"]).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(floats(&out, "close"), vec![Some(10.0), Some(11.0)]);
    }

    #[test]
    fn test_drop_nulls_unknown_column() {
        assert!(matches!(
            drop_nulls(&sample(), &["volume"]),
            Err(TransformError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_impute_nulls() {
        let mapping = BTreeMap::from([
            ("close".to_string(), FillValue::Int(0)),
            ("tag".to_string(), FillValue::Text("unknown".to_string())),
        ]);
        let out = impute_nulls(&sample(), &mapping).unwrap();

        assert_eq!(
            floats(&out, "close"),
            vec![Some(10.0), Some(0.0), Some(11.0), Some(12.0)]
        );
        let tags = out
            .column_by_name("tag")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(tags.value(3), "unknown");
        // Untouched column keeps its null
        assert_eq!(out.column_by_name("open_time").unwrap().null_count(), 1);
    }

    #[test]
    fn test_count_nulls() {
        let counts = count_nulls(&sample(), &["open_time", "close", "tag"]).unwrap();
        assert_eq!(counts["open_time"], 1);
        assert_eq!(counts["close"], 1);
        assert_eq!(counts["tag"], 1);
    }
}
