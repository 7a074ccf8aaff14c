//! Read side of a versioned table.

use crate::error::{StoreError, StoreResult};
use crate::log::{DataFile, TableLog, TableSnapshot};
use crate::schema::TableSchema;
use arrow::array::{ArrayRef, BooleanArray, Int64Array};
use arrow::compute::kernels::cmp;
use arrow::compute::{cast, concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Comparison applied by a [`ColumnFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

/// Row filter on an integer-like column (`id`, epoch-ms timestamps, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub op: Comparison,
    pub value: i64,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, op: Comparison, value: i64) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn greater_than(column: impl Into<String>, value: i64) -> Self {
        Self::new(column, Comparison::Gt, value)
    }

    /// Evaluate against a batch. Null values never match.
    pub fn evaluate(&self, batch: &RecordBatch) -> StoreResult<BooleanArray> {
        let column = batch
            .column_by_name(&self.column)
            .ok_or_else(|| StoreError::ColumnNotFound(self.column.clone()))?;
        let values: ArrayRef = cast(column, &DataType::Int64)?;
        let scalar = Int64Array::new_scalar(self.value);

        let mask = match self.op {
            Comparison::Eq => cmp::eq(&values, &scalar)?,
            Comparison::Gt => cmp::gt(&values, &scalar)?,
            Comparison::GtEq => cmp::gt_eq(&values, &scalar)?,
            Comparison::Lt => cmp::lt(&values, &scalar)?,
            Comparison::LtEq => cmp::lt_eq(&values, &scalar)?,
        };
        Ok(mask)
    }
}

/// A table opened at its latest version.
#[derive(Debug, Clone)]
pub struct VersionedTable {
    root: PathBuf,
    snapshot: TableSnapshot,
}

impl VersionedTable {
    /// Open the table at `root`. Returns `Ok(None)` when no table exists yet.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Option<Self>> {
        let root = root.as_ref().to_path_buf();
        let Some(snapshot) = TableLog::new(&root).snapshot()? else {
            return Ok(None);
        };
        debug!(
            root = %root.display(),
            version = snapshot.version,
            files = snapshot.files.len(),
            "Opened versioned table"
        );
        Ok(Some(Self { root, snapshot }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn schema(&self) -> &TableSchema {
        &self.snapshot.schema
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        self.snapshot.schema.to_arrow()
    }

    pub fn partition_columns(&self) -> &[String] {
        &self.snapshot.partition_columns
    }

    pub fn files(&self) -> impl Iterator<Item = &DataFile> {
        self.snapshot.files.values()
    }

    pub fn num_rows(&self) -> u64 {
        self.snapshot.num_rows()
    }

    pub(crate) fn snapshot(&self) -> &TableSnapshot {
        &self.snapshot
    }

    /// Read every live row into one batch.
    pub fn scan(&self) -> StoreResult<RecordBatch> {
        self.read(None, None)
    }

    /// Read the rows matching `filter`.
    pub fn scan_filtered(&self, filter: &ColumnFilter) -> StoreResult<RecordBatch> {
        self.read(None, Some(filter))
    }

    /// Read only the named columns (in table order).
    pub fn scan_columns(&self, columns: &[&str]) -> StoreResult<RecordBatch> {
        let schema = self.arrow_schema();
        let mut indices = columns
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map_err(|_| StoreError::ColumnNotFound((*name).to_string()))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        indices.sort_unstable();
        indices.dedup();
        self.read(Some(&indices), None)
    }

    fn read(
        &self,
        projection: Option<&[usize]>,
        filter: Option<&ColumnFilter>,
    ) -> StoreResult<RecordBatch> {
        let full_schema = self.arrow_schema();
        let schema = match projection {
            Some(indices) => SchemaRef::new(full_schema.project(indices)?),
            None => full_schema,
        };

        let mut batches = Vec::new();
        for file in self.snapshot.files.values() {
            let path = self.root.join(&file.path);
            let handle = File::open(&path).map_err(|e| StoreError::io(&path, e))?;
            let mut builder = ParquetRecordBatchReaderBuilder::try_new(handle)?;
            if let Some(indices) = projection {
                let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
                builder = builder.with_projection(mask);
            }

            for batch in builder.build()? {
                let batch = batch?;
                // Re-attach the canonical schema so every file concatenates
                let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;
                let batch = match filter {
                    Some(filter) => filter_record_batch(&batch, &filter.evaluate(&batch)?)?,
                    None => batch,
                };
                if batch.num_rows() > 0 {
                    batches.push(batch);
                }
            }
        }

        Ok(concat_batches(&schema, &batches)?)
    }
}

