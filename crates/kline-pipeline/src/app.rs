//! Stage orchestration for full and incremental runs.

use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use kline_core::fs::write_atomic;
use kline_core::{Dataset, Layer};
use kline_extract::{
    klines_to_batch, mark_promoted, records_to_batch, require, BinanceClient, CheckpointRecord,
    CheckpointStore, FetchOutcome, HistoricalTrades, IncrementalFetcher, Record, TradeSource,
};
use kline_store::{ColumnFilter, MergePredicate, TableWriter, VersionedTable, WriteMode};
use kline_telemetry::{RunSummary, StageTimer};
use kline_transform::{
    clean_klines, clean_trades, daily_trade_summary, monthly_kline_summary, profile,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Stage names as they appear in logs and run summaries.
pub mod stages {
    pub const EXTRACT: &str = "extract";
    pub const BRONZE: &str = "bronze";
    pub const SILVER: &str = "silver";
    pub const GOLD: &str = "gold";
    pub const CHECKPOINT: &str = "checkpoint";
}

/// Record a finished stage, or log its failure and pass the error on.
fn track<T>(
    summary: &mut RunSummary,
    timer: StageTimer,
    result: AppResult<T>,
    rows: impl FnOnce(&T) -> usize,
) -> AppResult<T> {
    match result {
        Ok(value) => {
            summary.record(timer.finish(rows(&value)));
            Ok(value)
        }
        Err(e) => {
            timer.fail(&e);
            Err(e)
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    writer: TableWriter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            writer: TableWriter::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn client(&self) -> AppResult<BinanceClient> {
        let api_key = self.config.api_key();
        if api_key.is_none() && self.config.api.api_key_env.is_some() {
            warn!(
                var = ?self.config.api.api_key_env,
                "API key variable is unset, sending requests without a key"
            );
        }
        Ok(BinanceClient::new(&self.config.api.base_url, api_key)?)
    }

    fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(self.config.checkpoint_path())
    }

    fn kline_predicate(&self) -> AppResult<MergePredicate> {
        Ok(MergePredicate::on([self.config.pipeline.kline_key.as_str()])?)
    }

    fn trade_predicate(&self) -> AppResult<MergePredicate> {
        Ok(MergePredicate::on([self.config.pipeline.trade_key.as_str()])?)
    }

    /// Full run: fetch the configured klines window and rebuild every layer.
    pub async fn run_full(&self) -> AppResult<RunSummary> {
        let mut summary = RunSummary::new("full");

        let timer = StageTimer::start(stages::EXTRACT);
        let fetched = self.fetch_klines().await;
        let raw = track(&mut summary, timer, fetched, Vec::len)?;

        self.load_klines(&raw, &mut summary)?;
        summary.log();
        Ok(summary)
    }

    async fn fetch_klines(&self) -> AppResult<Vec<Value>> {
        let request = self.config.kline_request()?;
        info!(
            symbol = %request.symbol,
            interval = %request.interval,
            start_time = request.start_time,
            end_time = request.end_time,
            "Fetching klines"
        );
        Ok(self
            .client()?
            .fetch_klines(&self.config.api.klines_endpoint, &request)
            .await?)
    }

    /// Bronze, silver and gold builds for an already fetched klines payload.
    pub fn load_klines(&self, raw: &[Value], summary: &mut RunSummary) -> AppResult<()> {
        let bronze_path = self.config.table_path(Layer::Bronze, Dataset::Klines);
        let silver_path = self.config.table_path(Layer::Silver, Dataset::Klines);
        let gold_path = self.config.table_path(Layer::Gold, Dataset::Klines);

        let timer = StageTimer::start(stages::BRONZE);
        let bronze = self.write_bronze_klines(raw, &bronze_path);
        let bronze = track(summary, timer, bronze, RecordBatch::num_rows)?;

        let timer = StageTimer::start(stages::SILVER);
        let silver = self.merge_silver_klines(&bronze, &silver_path);
        track(summary, timer, silver, |rows| *rows)?;

        let timer = StageTimer::start(stages::GOLD);
        let gold = self.rebuild_gold(&silver_path, &gold_path, monthly_kline_summary);
        track(summary, timer, gold, |rows| *rows)?;
        Ok(())
    }

    fn write_bronze_klines(&self, raw: &[Value], path: &Path) -> AppResult<RecordBatch> {
        let batch = klines_to_batch(raw)?;
        self.writer
            .write_full(&batch, path, WriteMode::Overwrite, &[])?;
        Ok(batch)
    }

    /// Klines are keyed by `open_time`, so re-running a window only adds new candles.
    fn merge_silver_klines(&self, bronze: &RecordBatch, path: &Path) -> AppResult<usize> {
        let cleaned = clean_klines(bronze)?;
        let report = self.writer.merge_upsert(
            &cleaned,
            path,
            &self.kline_predicate()?,
            &self.config.pipeline.partition_columns,
        )?;
        info!(
            rows_written = report.rows_written,
            rows_skipped = report.rows_skipped,
            version = ?report.version,
            "Silver klines merged"
        );
        Ok(report.rows_written)
    }

    /// Incremental run against the Binance `historicalTrades` endpoint.
    pub async fn run_incremental(&self) -> AppResult<RunSummary> {
        let source = HistoricalTrades::new(
            self.client()?,
            &self.config.api.trades_endpoint,
            &self.config.api.symbol,
            self.config.api.trades_limit,
        );
        self.run_incremental_with(source).await
    }

    /// Incremental run with any record source.
    ///
    /// Rows left unpromoted by an earlier run are promoted first, since the
    /// fetch commit moves `previous_id` past them. The fetched batch is then
    /// merged into bronze before the checkpoint commit and promoted. An
    /// interrupted run re-fetches the same window and the bronze merge turns
    /// the repeat into a no-op.
    pub async fn run_incremental_with<S: TradeSource>(&self, source: S) -> AppResult<RunSummary> {
        let mut summary = RunSummary::new("incremental");
        let store = self.checkpoint_store();
        let current = require(&store)?;
        if current.previous_id < current.last_id {
            info!(
                previous_id = current.previous_id,
                last_id = current.last_id,
                "Promoting rows left by an earlier run"
            );
            self.promote_into(&mut summary)?;
        }

        let fetcher = IncrementalFetcher::new(store, source);

        let timer = StageTimer::start(stages::EXTRACT);
        let outcome = fetcher.begin().await.map_err(AppError::from);
        let outcome = track(&mut summary, timer, outcome, |o| match o {
            FetchOutcome::Empty(_) => 0,
            FetchOutcome::Pending(cycle) => cycle.records().len(),
        })?;

        match outcome {
            FetchOutcome::Empty(current) => {
                info!(last_id = current.last_id, "Checkpoint already current");
            }
            FetchOutcome::Pending(cycle) => {
                let bronze_path = self.config.table_path(Layer::Bronze, Dataset::HistoricalTrades);
                let timer = StageTimer::start(stages::BRONZE);
                let written = self.merge_bronze_trades(cycle.records(), &bronze_path);
                track(&mut summary, timer, written, |rows| *rows)?;

                let timer = StageTimer::start(stages::CHECKPOINT);
                let committed = cycle.commit().map_err(AppError::from);
                track(&mut summary, timer, committed, |_| 0)?;
            }
        }

        self.promote_into(&mut summary)?;
        summary.log();
        Ok(summary)
    }

    fn merge_bronze_trades(&self, records: &[Record], path: &Path) -> AppResult<usize> {
        let Some(batch) = records_to_batch(records)? else {
            return Ok(0);
        };
        let report = self
            .writer
            .merge_upsert(&batch, path, &self.trade_predicate()?, &[])?;
        Ok(report.rows_written)
    }

    /// Move bronze trades newer than `previous_id` into silver and rebuild gold.
    pub fn run_promote(&self) -> AppResult<RunSummary> {
        let mut summary = RunSummary::new("promote");
        self.promote_into(&mut summary)?;
        summary.log();
        Ok(summary)
    }

    fn promote_into(&self, summary: &mut RunSummary) -> AppResult<()> {
        let store = self.checkpoint_store();
        let checkpoint = require(&store)?;
        if checkpoint.previous_id == checkpoint.last_id {
            info!(last_id = checkpoint.last_id, "Nothing to promote");
            return Ok(());
        }

        let bronze_path = self.config.table_path(Layer::Bronze, Dataset::HistoricalTrades);
        let silver_path = self.config.table_path(Layer::Silver, Dataset::HistoricalTrades);
        let gold_path = self.config.table_path(Layer::Gold, Dataset::HistoricalTrades);

        let timer = StageTimer::start(stages::SILVER);
        let promoted = self.merge_silver_trades(checkpoint.previous_id, &bronze_path, &silver_path);
        track(summary, timer, promoted, |rows| *rows)?;

        // Checkpoint last: a failed gold rebuild leaves the range pending
        let timer = StageTimer::start(stages::GOLD);
        let gold = self.rebuild_gold(&silver_path, &gold_path, daily_trade_summary);
        track(summary, timer, gold, |rows| *rows)?;

        let timer = StageTimer::start(stages::CHECKPOINT);
        let marked = mark_promoted(&store).map_err(AppError::from);
        track(summary, timer, marked, |_| 0)?;
        Ok(())
    }

    fn merge_silver_trades(
        &self,
        previous_id: u64,
        bronze_path: &Path,
        silver_path: &Path,
    ) -> AppResult<usize> {
        let Some(bronze) = VersionedTable::open(bronze_path)? else {
            return Err(AppError::TableNotFound(bronze_path.display().to_string()));
        };
        let after = i64::try_from(previous_id).unwrap_or(i64::MAX);
        let fresh = bronze.scan_filtered(&ColumnFilter::greater_than(
            self.config.pipeline.trade_key.as_str(),
            after,
        ))?;
        info!(rows = fresh.num_rows(), previous_id, "Bronze trades to promote");
        if fresh.num_rows() == 0 {
            return Ok(0);
        }

        let cleaned = clean_trades(&fresh)?;
        let report = self.writer.merge_upsert(
            &cleaned,
            silver_path,
            &self.trade_predicate()?,
            &self.config.pipeline.partition_columns,
        )?;
        Ok(report.rows_written)
    }

    /// Overwrite the gold table with `build` applied to the whole silver table.
    fn rebuild_gold<F>(&self, silver_path: &Path, gold_path: &Path, build: F) -> AppResult<usize>
    where
        F: Fn(&RecordBatch) -> kline_transform::TransformResult<RecordBatch>,
    {
        let Some(silver) = VersionedTable::open(silver_path)? else {
            warn!(path = %silver_path.display(), "No silver table, skipping gold");
            return Ok(0);
        };
        let summary = build(&silver.scan()?)?;
        self.writer
            .write_full(&summary, gold_path, WriteMode::Overwrite, &[])?;
        Ok(summary.num_rows())
    }

    /// Bootstrap the checkpoint used by incremental runs.
    pub fn init_checkpoint(&self, seed: u64, force: bool) -> AppResult<CheckpointRecord> {
        let record = self.checkpoint_store().initialize(seed, force)?;
        info!(seed, path = %self.config.checkpoint_path().display(), "Checkpoint initialized");
        Ok(record)
    }

    /// Profile one table and write the report as JSON. Returns the report path.
    pub fn profile(&self, layer: Layer, dataset: Dataset) -> AppResult<PathBuf> {
        let path = self.config.table_path(layer, dataset);
        let Some(table) = VersionedTable::open(&path)? else {
            return Err(AppError::TableNotFound(path.display().to_string()));
        };

        let report = profile(&table.scan()?)?;
        let file_name = format!(
            "profile_{}_{}_{}.json",
            layer,
            dataset.dir_name(),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let target = self.config.report_dir().join(file_name);
        write_atomic(&target, serde_json::to_string_pretty(&report)?.as_bytes())?;

        info!(
            path = %target.display(),
            rows = report.num_rows,
            columns = report.num_columns,
            version = table.version(),
            "Profile report written"
        );
        Ok(target)
    }
}
