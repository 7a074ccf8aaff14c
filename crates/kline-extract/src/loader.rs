//! JSON API payloads to Arrow record batches.

use crate::error::{ExtractError, ExtractResult};
use crate::record::Record;
use arrow::array::{ArrayRef, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::json::reader::{infer_json_schema_from_iterator, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use kline_core::columns::{KLINE_COLUMN_COUNT, KLINE_INTEGER_POSITIONS};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Bronze schema for positional klines: `"0".."11"`, Int64 time and count
/// slots, Utf8 everywhere else.
pub fn kline_bronze_schema() -> Schema {
    let fields: Vec<Field> = (0..KLINE_COLUMN_COUNT)
        .map(|i| {
            let ty = if KLINE_INTEGER_POSITIONS.contains(&i) {
                DataType::Int64
            } else {
                DataType::Utf8
            };
            Field::new(i.to_string(), ty, true)
        })
        .collect();
    Schema::new(fields)
}

enum SlotBuilder {
    Int(Int64Builder),
    Text(StringBuilder),
}

/// Build the bronze klines batch from the raw API arrays.
pub fn klines_to_batch(rows: &[Value]) -> ExtractResult<RecordBatch> {
    let schema = Arc::new(kline_bronze_schema());
    let mut builders: Vec<SlotBuilder> = schema
        .fields()
        .iter()
        .map(|f| match f.data_type() {
            DataType::Int64 => SlotBuilder::Int(Int64Builder::with_capacity(rows.len())),
            _ => SlotBuilder::Text(StringBuilder::with_capacity(rows.len(), rows.len() * 16)),
        })
        .collect();

    for (row_index, row) in rows.iter().enumerate() {
        let items = row.as_array().ok_or_else(|| {
            ExtractError::InvalidResponse(format!("kline {row_index} is not an array"))
        })?;
        if items.len() != KLINE_COLUMN_COUNT {
            return Err(ExtractError::InvalidResponse(format!(
                "kline {row_index} has {} fields, expected {KLINE_COLUMN_COUNT}",
                items.len()
            )));
        }

        for (slot, (builder, item)) in builders.iter_mut().zip(items).enumerate() {
            match builder {
                SlotBuilder::Int(b) => match item {
                    Value::Null => b.append_null(),
                    other => b.append_value(other.as_i64().ok_or_else(|| {
                        ExtractError::InvalidResponse(format!(
                            "kline {row_index} slot {slot} is not an integer"
                        ))
                    })?),
                },
                SlotBuilder::Text(b) => match item {
                    Value::Null => b.append_null(),
                    Value::String(s) => b.append_value(s),
                    other => b.append_value(other.to_string()),
                },
            }
        }
    }

    let columns: Vec<ArrayRef> = builders
        .into_iter()
        .map(|b| -> ArrayRef {
            match b {
                SlotBuilder::Int(mut b) => Arc::new(b.finish()),
                SlotBuilder::Text(mut b) => Arc::new(b.finish()),
            }
        })
        .collect();

    debug!(rows = rows.len(), "Built klines batch");
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Build a batch from keyed records, inferring the schema from the payloads.
pub fn records_to_batch(records: &[Record]) -> ExtractResult<Option<RecordBatch>> {
    if records.is_empty() {
        return Ok(None);
    }

    let values: Vec<Value> = records
        .iter()
        .map(|r| Value::Object(r.payload.clone()))
        .collect();
    let schema = infer_json_schema_from_iterator(values.iter().map(|v| Ok(v.clone())))?;

    let mut decoder = ReaderBuilder::new(Arc::new(schema))
        .with_batch_size(values.len())
        .build_decoder()?;
    decoder.serialize(&values)?;
    let batch = decoder.flush()?.ok_or_else(|| {
        ExtractError::InvalidResponse("no rows decoded from records".to_string())
    })?;

    debug!(rows = batch.num_rows(), columns = batch.num_columns(), "Built records batch");
    Ok(Some(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, BooleanArray, Int64Array, StringArray};
    use serde_json::json;

    fn kline(open_time: i64, close: &str) -> Value {
        json!([
            open_time, "1.0", "2.0", "0.5", close, "100.0",
            open_time + 86_399_999, "1000.0", 42, "50.0", "500.0", "0"
        ])
    }

    #[test]
    fn test_klines_to_batch() {
        let batch = klines_to_batch(&[
            kline(1_722_384_000_000, "1.5"),
            kline(1_722_470_400_000, "1.7"),
        ])
        .unwrap();

        assert_eq!(batch.num_columns(), KLINE_COLUMN_COUNT);
        assert_eq!(batch.num_rows(), 2);
        let open_time = batch
            .column_by_name("0")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(open_time.value(1), 1_722_470_400_000);
        let close = batch
            .column_by_name("4")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(close.value(0), "1.5");
        let trades = batch
            .column_by_name("8")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(trades.value(0), 42);
    }

    #[test]
    fn test_klines_rejects_short_rows() {
        let err = klines_to_batch(&[json!([1, "2"])]).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidResponse(_)));
    }

    #[test]
    fn test_records_to_batch_infers_types() {
        let records: Vec<Record> = [
            json!({"id": 201, "price": "142.10", "qty": "1.5", "time": 1_722_384_000_000i64, "isBuyerMaker": true}),
            json!({"id": 202, "price": "142.20", "qty": "0.5", "time": 1_722_384_000_100i64, "isBuyerMaker": false}),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).unwrap())
        .collect();

        let batch = records_to_batch(&records).unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);

        let schema = batch.schema();
        assert_eq!(schema.field_with_name("id").unwrap().data_type(), &DataType::Int64);
        assert_eq!(schema.field_with_name("price").unwrap().data_type(), &DataType::Utf8);

        let maker = batch
            .column_by_name("isBuyerMaker")
            .unwrap()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .unwrap();
        assert!(maker.value(0));
        assert!(!maker.value(1));
    }

    #[test]
    fn test_records_to_batch_empty() {
        assert!(records_to_batch(&[]).unwrap().is_none());
    }
}
