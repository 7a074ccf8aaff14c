//! Logical table schema recorded in the commit log.
//!
//! The log stores a small, serializable column model instead of a raw Arrow
//! schema. Every stored column is nullable so that files written by different
//! commits always concatenate under one Arrow schema.

use crate::error::{StoreError, StoreResult};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Column types the table format can persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    /// Millisecond timestamp without time zone.
    TimestampMillis,
    Date32,
}

impl ColumnType {
    pub fn to_arrow(self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float32 => DataType::Float32,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::TimestampMillis => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnType::Date32 => DataType::Date32,
        }
    }

    pub fn from_arrow(data_type: &DataType) -> StoreResult<Self> {
        match data_type {
            DataType::Boolean => Ok(ColumnType::Boolean),
            DataType::Int32 => Ok(ColumnType::Int32),
            DataType::Int64 => Ok(ColumnType::Int64),
            DataType::Float32 => Ok(ColumnType::Float32),
            DataType::Float64 => Ok(ColumnType::Float64),
            DataType::Utf8 => Ok(ColumnType::Utf8),
            DataType::Timestamp(TimeUnit::Millisecond, None) => Ok(ColumnType::TimestampMillis),
            DataType::Date32 => Ok(ColumnType::Date32),
            other => Err(StoreError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_arrow())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: ColumnType,
}

/// Ordered column list of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<TableColumn>,
}

impl TableSchema {
    pub fn from_arrow(schema: &Schema) -> StoreResult<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                Ok(TableColumn {
                    name: field.name().clone(),
                    data_type: ColumnType::from_arrow(field.data_type())?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn to_arrow(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.clone(), c.data_type.to_arrow(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check that `incoming` has exactly this table's columns, in order, with
    /// the same types.
    pub fn check_compatible(&self, incoming: &Schema) -> StoreResult<()> {
        let incoming = TableSchema::from_arrow(incoming)
            .map_err(|e| StoreError::SchemaConflict(e.to_string()))?;

        if incoming.columns.len() != self.columns.len() {
            return Err(StoreError::SchemaConflict(format!(
                "expected {} columns [{}], got {} columns [{}]",
                self.columns.len(),
                self.column_names().join(", "),
                incoming.columns.len(),
                incoming.column_names().join(", ")
            )));
        }

        for (expected, actual) in self.columns.iter().zip(&incoming.columns) {
            if expected != actual {
                return Err(StoreError::SchemaConflict(format!(
                    "column '{}' ({}) does not match incoming '{}' ({})",
                    expected.name, expected.data_type, actual.name, actual.data_type
                )));
            }
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: Vec<(&str, DataType)>) -> Schema {
        Schema::new(
            fields
                .into_iter()
                .map(|(n, t)| Field::new(n, t, false))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_roundtrip_marks_columns_nullable() {
        let arrow = schema(vec![
            ("id", DataType::Int64),
            ("open_time", DataType::Timestamp(TimeUnit::Millisecond, None)),
        ]);
        let table = TableSchema::from_arrow(&arrow).unwrap();
        let back = table.to_arrow();
        assert_eq!(back.fields().len(), 2);
        assert!(back.field(0).is_nullable());
        assert_eq!(back.field(1).data_type(), arrow.field(1).data_type());
    }

    #[test]
    fn test_check_compatible_ignores_nullability() {
        let table =
            TableSchema::from_arrow(&schema(vec![("id", DataType::Int64)])).unwrap();
        let nullable = Schema::new(vec![Field::new("id", DataType::Int64, true)]);
        table.check_compatible(&nullable).unwrap();
    }

    #[test]
    fn test_check_compatible_rejects_type_change() {
        let table =
            TableSchema::from_arrow(&schema(vec![("id", DataType::Int64)])).unwrap();
        let err = table
            .check_compatible(&schema(vec![("id", DataType::Utf8)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict(_)));
    }

    #[test]
    fn test_check_compatible_rejects_extra_column() {
        let table =
            TableSchema::from_arrow(&schema(vec![("id", DataType::Int64)])).unwrap();
        let err = table
            .check_compatible(&schema(vec![
                ("id", DataType::Int64),
                ("price", DataType::Float64),
            ]))
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict(_)));
    }

    #[test]
    fn test_unsupported_type() {
        assert!(matches!(
            ColumnType::from_arrow(&DataType::Float16),
            Err(StoreError::UnsupportedType(_))
        ));
    }
}
