//! Commit log for versioned tables.
//!
//! Layout:
//!   <root>/_table_log/00000000000000000001.json
//!   <root>/_table_log/00000000000000000002.json
//!
//! Each commit file is created exactly once (create-new semantics), so the
//! version number doubles as the write guard. A table exists iff at least
//! one commit exists. Data files referenced by a commit are written before
//! the commit, which means an interrupted write leaves only unreferenced
//! Parquet files behind.

use crate::error::{StoreError, StoreResult};
use crate::schema::TableSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// How a full write treats an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the table content with the new rows.
    #[default]
    Overwrite,
    /// Add the new rows next to the existing ones.
    Append,
    /// Fail when the table already exists.
    #[serde(rename = "error")]
    ErrorIfExists,
    /// Do nothing when the table already exists.
    Ignore,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Append => "append",
            WriteMode::ErrorIfExists => "error",
            WriteMode::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

impl FromStr for WriteMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(WriteMode::Overwrite),
            "append" => Ok(WriteMode::Append),
            "error" => Ok(WriteMode::ErrorIfExists),
            "ignore" => Ok(WriteMode::Ignore),
            other => Err(StoreError::InvalidWriteMode(other.to_string())),
        }
    }
}

/// Operation that produced a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Write { mode: WriteMode },
    Merge { predicate: String },
}

/// A Parquet file belonging to the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// Path relative to the table root, `/`-separated.
    pub path: String,
    /// Partition column -> value for every row in the file.
    #[serde(default)]
    pub partition_values: BTreeMap<String, String>,
    pub num_rows: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Replace table metadata.
    Metadata {
        schema: TableSchema,
        partition_columns: Vec<String>,
    },
    Add(DataFile),
    Remove { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub actions: Vec<Action>,
}

/// Table state after replaying the log.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub version: u64,
    pub schema: TableSchema,
    pub partition_columns: Vec<String>,
    /// Live data files keyed by relative path.
    pub files: BTreeMap<String, DataFile>,
}

impl TableSnapshot {
    pub fn num_rows(&self) -> u64 {
        self.files.values().map(|f| f.num_rows).sum()
    }

    fn apply(state: Option<Self>, commit: &Commit) -> StoreResult<Self> {
        let mut schema = state.as_ref().map(|s| s.schema.clone());
        let mut partition_columns = state
            .as_ref()
            .map(|s| s.partition_columns.clone())
            .unwrap_or_default();
        let mut files = state.map(|s| s.files).unwrap_or_default();

        for action in &commit.actions {
            match action {
                Action::Metadata {
                    schema: new_schema,
                    partition_columns: new_partitions,
                } => {
                    schema = Some(new_schema.clone());
                    partition_columns = new_partitions.clone();
                }
                Action::Add(file) => {
                    files.insert(file.path.clone(), file.clone());
                }
                Action::Remove { path } => {
                    files.remove(path);
                }
            }
        }

        let schema = schema.ok_or_else(|| {
            StoreError::CorruptLog(format!(
                "commit {} precedes any metadata action",
                commit.version
            ))
        })?;

        Ok(Self {
            version: commit.version,
            schema,
            partition_columns,
            files,
        })
    }
}

/// Reader/writer for the `_table_log` directory of one table.
#[derive(Debug, Clone)]
pub struct TableLog {
    root: PathBuf,
}

impl TableLog {
    pub const LOG_DIR_NAME: &'static str = "_table_log";
    pub const COMMIT_FILENAME_DIGITS: usize = 20;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_dir(&self) -> PathBuf {
        self.root.join(Self::LOG_DIR_NAME)
    }

    fn commit_path(&self, version: u64) -> PathBuf {
        self.log_dir().join(format!(
            "{:0width$}.json",
            version,
            width = Self::COMMIT_FILENAME_DIGITS
        ))
    }

    /// Committed versions in ascending order. Empty when no table exists.
    pub fn versions(&self) -> StoreResult<Vec<u64>> {
        let dir = self.log_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Skip staging files and anything else that is not a commit
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if stem.len() != Self::COMMIT_FILENAME_DIGITS {
                continue;
            }
            if let Ok(version) = stem.parse::<u64>() {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn load_commit(&self, version: u64) -> StoreResult<Commit> {
        let path = self.commit_path(version);
        let json = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let commit: Commit = serde_json::from_str(&json).map_err(|e| {
            StoreError::CorruptLog(format!("failed to parse commit {version}: {e}"))
        })?;
        if commit.version != version {
            return Err(StoreError::CorruptLog(format!(
                "commit file {version} records version {}",
                commit.version
            )));
        }
        Ok(commit)
    }

    /// Replay the log. `None` means no table exists at this root.
    pub fn snapshot(&self) -> StoreResult<Option<TableSnapshot>> {
        let versions = self.versions()?;
        let mut state: Option<TableSnapshot> = None;

        for (expected, version) in (1u64..).zip(versions) {
            if version != expected {
                return Err(StoreError::CorruptLog(format!(
                    "missing commit {expected} (found {version})"
                )));
            }
            let commit = self.load_commit(version)?;
            state = Some(TableSnapshot::apply(state, &commit)?);
        }

        Ok(state)
    }

    /// Write commit `version`. Fails with `ConcurrentCommit` if it exists.
    pub fn commit(
        &self,
        version: u64,
        operation: Operation,
        actions: Vec<Action>,
    ) -> StoreResult<Commit> {
        let commit = Commit {
            version,
            timestamp: Utc::now(),
            operation,
            actions,
        };
        let json = serde_json::to_vec_pretty(&commit)?;
        let path = self.commit_path(version);

        match kline_core::fs::write_new_atomic(&path, &json) {
            Ok(()) => {}
            Err(kline_core::CoreError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::AlreadyExists =>
            {
                return Err(StoreError::ConcurrentCommit { version });
            }
            Err(e) => return Err(e.into()),
        }

        debug!(
            root = %self.root.display(),
            version,
            actions = commit.actions.len(),
            "Committed table version"
        );
        Ok(commit)
    }
}
