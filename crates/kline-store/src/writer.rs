//! Write side of a versioned table: full writes and insert-only merges.
//!
//! Every write stages its Parquet files first and then publishes them with a
//! single commit. A crash before the commit leaves the table at its previous
//! version.

use crate::error::{StoreError, StoreResult};
use crate::log::{Action, DataFile, Operation, TableLog, WriteMode};
use crate::predicate::MergePredicate;
use crate::schema::TableSchema;
use crate::table::VersionedTable;
use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::compute::{filter_record_batch, take_record_batch};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::row::{OwnedRow, RowConverter, SortField};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// Directory value used for null partition values.
pub const NULL_PARTITION: &str = "__NULL__";

/// Outcome of a write or merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Version committed by this call, `None` when nothing was committed.
    pub version: Option<u64>,
    /// True when this call created the table.
    pub created: bool,
    pub rows_written: usize,
    /// Incoming rows not written because their key was already present.
    pub rows_skipped: usize,
    pub files_added: usize,
}

/// Writes record batches into versioned tables.
#[derive(Debug, Clone)]
pub struct TableWriter {
    properties: WriterProperties,
}

impl Default for TableWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableWriter {
    /// Writer producing snappy-compressed Parquet files.
    pub fn new() -> Self {
        Self::with_properties(
            WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build(),
        )
    }

    pub fn with_properties(properties: WriterProperties) -> Self {
        Self { properties }
    }

    /// Write `rows` to the table at `path` without deduplication.
    ///
    /// `partition_columns` takes effect when the table is created or
    /// overwritten; appends use the table's existing partitioning.
    pub fn write_full(
        &self,
        rows: &RecordBatch,
        path: &Path,
        mode: WriteMode,
        partition_columns: &[String],
    ) -> StoreResult<WriteReport> {
        match VersionedTable::open(path)? {
            None => self.create(rows, path, mode, partition_columns),
            Some(table) => match mode {
                WriteMode::ErrorIfExists => {
                    Err(StoreError::TableExists(path.display().to_string()))
                }
                WriteMode::Ignore => {
                    info!(path = %path.display(), "Table exists, ignoring write");
                    Ok(WriteReport::default())
                }
                WriteMode::Append => self.append(&table, rows, partition_columns),
                WriteMode::Overwrite => self.overwrite(&table, rows, partition_columns),
            },
        }
    }

    /// Insert the rows of `rows` whose key is not yet present in the table.
    ///
    /// Rows already in the table are never rewritten. Repeated keys inside
    /// `rows` keep their first occurrence. A row with a null key column never
    /// matches and is always inserted. When no table exists the batch is
    /// written as-is, like `write_full` with `WriteMode::Overwrite`.
    pub fn merge_upsert(
        &self,
        rows: &RecordBatch,
        path: &Path,
        predicate: &MergePredicate,
        partition_columns: &[String],
    ) -> StoreResult<WriteReport> {
        let Some(table) = VersionedTable::open(path)? else {
            info!(path = %path.display(), "No table yet, bootstrapping merge target");
            return self.write_full(rows, path, WriteMode::Overwrite, partition_columns);
        };

        table.schema().check_compatible(rows.schema().as_ref())?;
        warn_on_partition_mismatch(&table, partition_columns);

        let mask = new_key_mask(&table, rows, predicate)?;
        let inserted = filter_record_batch(rows, &mask)?;
        let skipped = rows.num_rows() - inserted.num_rows();

        if inserted.num_rows() == 0 {
            info!(
                path = %path.display(),
                skipped,
                "Merge matched every incoming row, nothing to commit"
            );
            return Ok(WriteReport {
                rows_skipped: skipped,
                ..WriteReport::default()
            });
        }

        let version = table.version() + 1;
        let files = self.write_data_files(
            path,
            version,
            &table.arrow_schema(),
            &inserted,
            table.partition_columns(),
        )?;
        let files_added = files.len();
        let actions = files.into_iter().map(Action::Add).collect();

        TableLog::new(path).commit(
            version,
            Operation::Merge {
                predicate: predicate.to_string(),
            },
            actions,
        )?;

        info!(
            path = %path.display(),
            version,
            inserted = inserted.num_rows(),
            skipped,
            "Merged new rows"
        );

        Ok(WriteReport {
            version: Some(version),
            created: false,
            rows_written: inserted.num_rows(),
            rows_skipped: skipped,
            files_added,
        })
    }

    fn create(
        &self,
        rows: &RecordBatch,
        path: &Path,
        mode: WriteMode,
        partition_columns: &[String],
    ) -> StoreResult<WriteReport> {
        let schema = TableSchema::from_arrow(rows.schema().as_ref())?;
        check_partition_columns(&schema, partition_columns)?;

        let version = 1;
        let files = self.write_data_files(path, version, &schema.to_arrow(), rows, partition_columns)?;
        let files_added = files.len();

        let mut actions = vec![Action::Metadata {
            schema,
            partition_columns: partition_columns.to_vec(),
        }];
        actions.extend(files.into_iter().map(Action::Add));
        TableLog::new(path).commit(version, Operation::Write { mode }, actions)?;

        info!(
            path = %path.display(),
            rows = rows.num_rows(),
            files = files_added,
            "Created table"
        );

        Ok(WriteReport {
            version: Some(version),
            created: true,
            rows_written: rows.num_rows(),
            rows_skipped: 0,
            files_added,
        })
    }

    fn append(
        &self,
        table: &VersionedTable,
        rows: &RecordBatch,
        partition_columns: &[String],
    ) -> StoreResult<WriteReport> {
        table.schema().check_compatible(rows.schema().as_ref())?;
        warn_on_partition_mismatch(table, partition_columns);

        if rows.num_rows() == 0 {
            debug!(path = %table.root().display(), "Empty append, nothing to commit");
            return Ok(WriteReport::default());
        }

        let version = table.version() + 1;
        let files = self.write_data_files(
            table.root(),
            version,
            &table.arrow_schema(),
            rows,
            table.partition_columns(),
        )?;
        let files_added = files.len();
        let actions = files.into_iter().map(Action::Add).collect();
        TableLog::new(table.root()).commit(
            version,
            Operation::Write {
                mode: WriteMode::Append,
            },
            actions,
        )?;

        info!(
            path = %table.root().display(),
            version,
            rows = rows.num_rows(),
            "Appended rows"
        );

        Ok(WriteReport {
            version: Some(version),
            created: false,
            rows_written: rows.num_rows(),
            rows_skipped: 0,
            files_added,
        })
    }

    fn overwrite(
        &self,
        table: &VersionedTable,
        rows: &RecordBatch,
        partition_columns: &[String],
    ) -> StoreResult<WriteReport> {
        let schema = TableSchema::from_arrow(rows.schema().as_ref())?;
        check_partition_columns(&schema, partition_columns)?;

        let version = table.version() + 1;
        let files = self.write_data_files(
            table.root(),
            version,
            &schema.to_arrow(),
            rows,
            partition_columns,
        )?;
        let files_added = files.len();

        // Old files stay on disk for earlier versions; they just stop being live
        let mut actions: Vec<Action> = table
            .snapshot()
            .files
            .keys()
            .map(|path| Action::Remove { path: path.clone() })
            .collect();
        actions.push(Action::Metadata {
            schema,
            partition_columns: partition_columns.to_vec(),
        });
        actions.extend(files.into_iter().map(Action::Add));

        TableLog::new(table.root()).commit(
            version,
            Operation::Write {
                mode: WriteMode::Overwrite,
            },
            actions,
        )?;

        info!(
            path = %table.root().display(),
            version,
            rows = rows.num_rows(),
            "Overwrote table"
        );

        Ok(WriteReport {
            version: Some(version),
            created: false,
            rows_written: rows.num_rows(),
            rows_skipped: 0,
            files_added,
        })
    }

    /// Write one Parquet file per partition and describe them for the log.
    fn write_data_files(
        &self,
        root: &Path,
        version: u64,
        table_schema: &SchemaRef,
        rows: &RecordBatch,
        partition_columns: &[String],
    ) -> StoreResult<Vec<DataFile>> {
        if rows.num_rows() == 0 {
            return Ok(Vec::new());
        }

        let rows = RecordBatch::try_new(table_schema.clone(), rows.columns().to_vec())?;
        let mut files = Vec::new();

        for (index, (values, part)) in split_partitions(&rows, partition_columns)?
            .into_iter()
            .enumerate()
        {
            let mut rel = String::new();
            for column in partition_columns {
                let value = values.get(column).map(String::as_str).unwrap_or(NULL_PARTITION);
                rel.push_str(&format!("{column}={}/", sanitize_segment(value)));
            }
            rel.push_str(&format!(
                "part-{version:05}-{index:04}-{}.parquet",
                uuid::Uuid::new_v4()
            ));

            let full_path = root.join(&rel);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }

            let file = File::create(&full_path).map_err(|e| StoreError::io(&full_path, e))?;
            let mut writer =
                ArrowWriter::try_new(file, table_schema.clone(), Some(self.properties.clone()))?;
            writer.write(&part)?;
            writer.close()?;

            let size_bytes = fs::metadata(&full_path)
                .map_err(|e| StoreError::io(&full_path, e))?
                .len();

            debug!(path = %rel, rows = part.num_rows(), size_bytes, "Wrote data file");

            files.push(DataFile {
                path: rel,
                partition_values: values,
                num_rows: part.num_rows() as u64,
                size_bytes,
            });
        }

        Ok(files)
    }
}

/// Mask of incoming rows whose key is absent from the table and from the
/// earlier incoming rows.
fn new_key_mask(
    table: &VersionedTable,
    rows: &RecordBatch,
    predicate: &MergePredicate,
) -> StoreResult<BooleanArray> {
    let invalid = |reason: String| StoreError::InvalidPredicate {
        predicate: predicate.to_string(),
        reason,
    };

    let mut fields = Vec::with_capacity(predicate.keys().len());
    let mut source_columns: Vec<ArrayRef> = Vec::with_capacity(predicate.keys().len());
    for key in predicate.keys() {
        let target = table
            .schema()
            .column(&key.target)
            .ok_or_else(|| invalid(format!("target column '{}' not in table", key.target)))?;
        let source = rows
            .column_by_name(&key.source)
            .ok_or_else(|| invalid(format!("source column '{}' not in batch", key.source)))?;

        let target_type = target.data_type.to_arrow();
        if source.data_type() != &target_type {
            return Err(invalid(format!(
                "source.{} is {} but target.{} is {}",
                key.source,
                source.data_type(),
                key.target,
                target_type
            )));
        }
        fields.push(SortField::new(target_type));
        source_columns.push(source.clone());
    }

    let converter = RowConverter::new(fields)?;

    let target_names = predicate.target_columns();
    let existing = table.scan_columns(&target_names)?;
    let existing_columns = target_names
        .iter()
        .map(|name| {
            existing
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| StoreError::ColumnNotFound((*name).to_string()))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    // A null key never equals anything, so those rows are always inserted
    let has_null = |columns: &[ArrayRef], row: usize| columns.iter().any(|c| c.is_null(row));

    let mut seen: HashSet<OwnedRow> = converter
        .convert_columns(&existing_columns)?
        .iter()
        .enumerate()
        .filter(|(i, _)| !has_null(&existing_columns, *i))
        .map(|(_, row)| row.owned())
        .collect();

    let incoming = converter.convert_columns(&source_columns)?;
    let keep: Vec<bool> = incoming
        .iter()
        .enumerate()
        .map(|(i, row)| has_null(&source_columns, i) || seen.insert(row.owned()))
        .collect();

    Ok(BooleanArray::from(keep))
}

/// Group rows by their partition values, preserving first-seen order.
fn split_partitions(
    rows: &RecordBatch,
    partition_columns: &[String],
) -> StoreResult<Vec<(BTreeMap<String, String>, RecordBatch)>> {
    if partition_columns.is_empty() {
        return Ok(vec![(BTreeMap::new(), rows.clone())]);
    }

    let options = FormatOptions::default().with_null(NULL_PARTITION);
    let arrays = partition_columns
        .iter()
        .map(|name| {
            rows.column_by_name(name)
                .ok_or_else(|| StoreError::ColumnNotFound(name.clone()))
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let formatters = arrays
        .iter()
        .map(|array| ArrayFormatter::try_new(array.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut groups: BTreeMap<Vec<String>, Vec<u32>> = BTreeMap::new();
    for row in 0..rows.num_rows() {
        let key: Vec<String> = formatters
            .iter()
            .map(|f| f.value(row).to_string())
            .collect();
        let indices = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        indices.push(row as u32);
    }

    order
        .into_iter()
        .map(|key| {
            let indices = UInt32Array::from(groups.remove(&key).unwrap_or_default());
            let part = take_record_batch(rows, &indices)?;
            let values = partition_columns.iter().cloned().zip(key).collect();
            Ok((values, part))
        })
        .collect()
}

fn check_partition_columns(schema: &TableSchema, partition_columns: &[String]) -> StoreResult<()> {
    for column in partition_columns {
        if schema.column(column).is_none() {
            return Err(StoreError::ColumnNotFound(column.clone()));
        }
    }
    Ok(())
}

fn warn_on_partition_mismatch(table: &VersionedTable, requested: &[String]) {
    if !requested.is_empty() && requested != table.partition_columns() {
        warn!(
            path = %table.root().display(),
            requested = ?requested,
            existing = ?table.partition_columns(),
            "Ignoring requested partitioning, table keeps its existing partition columns"
        );
    }
}

fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
