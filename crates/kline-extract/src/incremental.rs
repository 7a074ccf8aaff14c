//! Checkpointed incremental extraction.
//!
//! A cycle reads the checkpoint, fetches records after `last_id`, and hands
//! the batch to the caller as a [`PendingCycle`]. The checkpoint moves only
//! when the caller commits that cycle after persisting the batch, so a crash
//! in between re-fetches the same window on the next run.

use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::error::{ExtractError, ExtractResult};
use crate::record::{max_id, Record};
use crate::source::TradeSource;
use tracing::{info, warn};

/// Result of [`IncrementalFetcher::begin`].
#[derive(Debug)]
pub enum FetchOutcome<'a> {
    /// Nothing new. The checkpoint is unchanged.
    Empty(CheckpointRecord),
    /// New records awaiting persistence and commit.
    Pending(PendingCycle<'a>),
}

/// A fetched batch whose checkpoint advance has not been written yet.
#[derive(Debug)]
#[must_use = "the checkpoint only advances when the cycle is committed"]
pub struct PendingCycle<'a> {
    store: &'a CheckpointStore,
    before: CheckpointRecord,
    after: CheckpointRecord,
    records: Vec<Record>,
}

impl<'a> PendingCycle<'a> {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn checkpoint_before(&self) -> CheckpointRecord {
        self.before
    }

    /// What [`commit`](Self::commit) will write.
    pub fn checkpoint_after(&self) -> CheckpointRecord {
        self.after
    }

    /// Record that the batch was persisted and advance the checkpoint.
    pub fn commit(self) -> ExtractResult<CheckpointRecord> {
        self.store.write(&self.after)?;
        info!(
            from = self.before.last_id,
            to = self.after.last_id,
            records = self.records.len(),
            "Incremental cycle committed"
        );
        Ok(self.after)
    }
}

pub struct IncrementalFetcher<S> {
    store: CheckpointStore,
    source: S,
}

impl<S: TradeSource> IncrementalFetcher<S> {
    pub fn new(store: CheckpointStore, source: S) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch the next window after the stored `last_id`.
    pub async fn begin(&self) -> ExtractResult<FetchOutcome<'_>> {
        let current = require(&self.store)?;
        info!(
            previous_id = current.previous_id,
            last_id = current.last_id,
            from_id = current.last_id.saturating_add(1),
            "Requesting records after checkpoint"
        );

        let records = self.source.fetch(current.last_id).await.map_err(|e| {
            warn!(error = %e, "Fetch failed; checkpoint left unchanged");
            e
        })?;

        let Some(batch_max) = max_id(&records) else {
            info!(last_id = current.last_id, "No new records");
            return Ok(FetchOutcome::Empty(current));
        };
        if batch_max <= current.last_id {
            return Err(ExtractError::NonMonotonicBatch {
                last_id: current.last_id,
                batch_max,
            });
        }

        info!(records = records.len(), batch_max, "Fetched records");
        Ok(FetchOutcome::Pending(PendingCycle {
            store: &self.store,
            before: current,
            after: current.after_fetch(batch_max),
            records,
        }))
    }
}

/// Read the checkpoint, treating a missing file as an error.
pub fn require(store: &CheckpointStore) -> ExtractResult<CheckpointRecord> {
    store
        .read()?
        .ok_or_else(|| ExtractError::CheckpointNotInitialized(store.path().display().to_string()))
}

/// Mark everything up to `last_id` as promoted downstream.
pub fn mark_promoted(store: &CheckpointStore) -> ExtractResult<CheckpointRecord> {
    let current = require(store)?;
    let promoted = current.after_promotion();
    if promoted != current {
        store.write(&promoted)?;
    }
    Ok(promoted)
}
