//! On-disk incremental progress.
//!
//! The checkpoint is a pretty-printed JSON object holding exactly
//! `previous_id` and `last_id`. Writes replace the whole file atomically.

use crate::error::{CheckpointError, CheckpointResult};
use kline_core::fs::write_atomic;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointRecord {
    /// Last id fully promoted downstream.
    pub previous_id: u64,
    /// Max id of the most recent successful fetch.
    pub last_id: u64,
}

impl CheckpointRecord {
    pub fn seed(id: u64) -> Self {
        Self {
            previous_id: id,
            last_id: id,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.last_id >= self.previous_id
    }

    /// Record after a fetch whose batch max is `new_last_id`.
    pub fn after_fetch(&self, new_last_id: u64) -> Self {
        Self {
            previous_id: self.last_id,
            last_id: new_last_id,
        }
    }

    /// Record after everything up to `last_id` reached the cleaned layer.
    pub fn after_promotion(&self) -> Self {
        Self::seed(self.last_id)
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record, or `None` when no checkpoint file exists yet.
    pub fn read(&self) -> CheckpointResult<Option<CheckpointRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(kline_core::CoreError::Io {
                    path: self.path.display().to_string(),
                    source,
                }
                .into())
            }
        };

        let record: CheckpointRecord =
            serde_json::from_slice(&bytes).map_err(|e| self.malformed(e.to_string()))?;
        if !record.is_valid() {
            return Err(self.malformed(format!(
                "last_id {} is below previous_id {}",
                record.last_id, record.previous_id
            )));
        }
        debug!(
            path = %self.path.display(),
            previous_id = record.previous_id,
            last_id = record.last_id,
            "Read checkpoint"
        );
        Ok(Some(record))
    }

    /// Replace the checkpoint with `record`.
    pub fn write(&self, record: &CheckpointRecord) -> CheckpointResult<()> {
        if !record.is_valid() {
            return Err(self.malformed(format!(
                "refusing to write last_id {} below previous_id {}",
                record.last_id, record.previous_id
            )));
        }
        let mut json = serde_json::to_string_pretty(record)
            .map_err(|e| self.malformed(e.to_string()))?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())?;
        info!(
            path = %self.path.display(),
            previous_id = record.previous_id,
            last_id = record.last_id,
            "Checkpoint written"
        );
        Ok(())
    }

    /// Bootstrap the checkpoint at `seed`. An existing file is kept unless `force`.
    pub fn initialize(&self, seed: u64, force: bool) -> CheckpointResult<CheckpointRecord> {
        if !force && self.path.exists() {
            return Err(CheckpointError::AlreadyExists(
                self.path.display().to_string(),
            ));
        }
        let record = CheckpointRecord::seed(seed);
        self.write(&record)?;
        Ok(record)
    }

    fn malformed(&self, reason: String) -> CheckpointError {
        CheckpointError::Malformed {
            path: self.path.display().to_string(),
            reason,
        }
    }
}
