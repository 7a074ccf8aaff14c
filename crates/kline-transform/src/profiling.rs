//! Column profile of a record batch, serialisable as a JSON report.

use crate::error::TransformResult;
use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub data_type: String,
    pub null_count: usize,
    /// Distinct non-null values.
    pub distinct_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub num_rows: usize,
    pub num_columns: usize,
    pub memory_bytes: usize,
    pub columns: Vec<ColumnProfile>,
}

pub fn profile(batch: &RecordBatch) -> TransformResult<ProfileReport> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| profile_column(field.name(), array))
        .collect::<TransformResult<Vec<_>>>()?;

    Ok(ProfileReport {
        num_rows: batch.num_rows(),
        num_columns: batch.num_columns(),
        memory_bytes: batch.get_array_memory_size(),
        columns,
    })
}

fn profile_column(name: &str, array: &ArrayRef) -> TransformResult<ColumnProfile> {
    let converter = RowConverter::new(vec![SortField::new(array.data_type().clone())])?;
    let rows = converter.convert_columns(&[Arc::clone(array)])?;
    let distinct: HashSet<_> = (0..array.len())
        .filter(|&i| array.is_valid(i))
        .map(|i| rows.row(i))
        .collect();

    let mut profile = ColumnProfile {
        name: name.to_string(),
        data_type: array.data_type().to_string(),
        null_count: array.null_count(),
        distinct_count: distinct.len(),
        min: None,
        max: None,
        mean: None,
    };

    if array.data_type().is_numeric() {
        let floats = cast(array, &DataType::Float64)?;
        if let Some(floats) = floats.as_any().downcast_ref::<Float64Array>() {
            let values: Vec<f64> = floats.iter().flatten().collect();
            if !values.is_empty() {
                profile.min = values.iter().copied().reduce(f64::min);
                profile.max = values.iter().copied().reduce(f64::max);
                profile.mean = Some(values.iter().sum::<f64>() / values.len() as f64);
            }
        }
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_profile_counts_and_stats() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("side", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(3), None, Some(3)])),
                Arc::new(StringArray::from(vec!["buy", "sell", "buy", "buy"])),
            ],
        )
        .unwrap();

        let report = profile(&batch).unwrap();
        assert_eq!(report.num_rows, 4);
        assert_eq!(report.num_columns, 2);

        let id = &report.columns[0];
        assert_eq!(id.null_count, 1);
        assert_eq!(id.distinct_count, 2);
        assert_eq!(id.min, Some(1.0));
        assert_eq!(id.max, Some(3.0));
        assert!((id.mean.unwrap() - 7.0 / 3.0).abs() < 1e-9);

        let side = &report.columns[1];
        assert_eq!(side.distinct_count, 2);
        assert!(side.min.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["columns"][1].get("mean").is_none());
    }
}
