//! End-to-end stage runs against temporary data directories.

use arrow::array::{Array, Int64Array};
use kline_core::{Dataset, Layer};
use kline_extract::{CheckpointRecord, CheckpointStore, ExtractError, MockTradeSource};
use kline_pipeline::app::stages;
use kline_pipeline::{AppError, Pipeline, PipelineConfig};
use kline_store::VersionedTable;
use kline_telemetry::RunSummary;
use serde_json::{json, Value};
use tempfile::TempDir;

fn pipeline(dir: &TempDir) -> Pipeline {
    let mut config = PipelineConfig::default();
    config.paths.data_dir = dir.path().join("data");
    config.paths.checkpoint_path = dir.path().join("metadata").join("incremental.json");
    Pipeline::new(config)
}

fn kline(open_time: i64, close: &str) -> Value {
    json!([
        open_time, "140.0", "150.0", "130.0", close, "1000.0",
        open_time + 86_399_999, "145000.0", 1200, "500.0", "72000.0", "0"
    ])
}

fn table(pipeline: &Pipeline, layer: Layer, dataset: Dataset) -> VersionedTable {
    VersionedTable::open(pipeline.config().table_path(layer, dataset))
        .unwrap()
        .unwrap()
}

fn sorted_ids(table: &VersionedTable) -> Vec<i64> {
    let batch = table.scan().unwrap();
    let mut ids = batch
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec();
    ids.sort_unstable();
    ids
}

/// Put a plain file where a table directory should go so writes to it fail.
fn block_table(pipeline: &Pipeline, layer: Layer, dataset: Dataset) -> std::path::PathBuf {
    let path = pipeline.config().table_path(layer, dataset);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"").unwrap();
    path
}

fn daily_count(pipeline: &Pipeline) -> i64 {
    let gold = table(pipeline, Layer::Gold, Dataset::HistoricalTrades).scan().unwrap();
    gold.column_by_name("count_id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .iter()
        .sum()
}

fn checkpoint(pipeline: &Pipeline) -> CheckpointRecord {
    CheckpointStore::new(pipeline.config().checkpoint_path())
        .read()
        .unwrap()
        .unwrap()
}

#[test]
fn test_load_klines_builds_every_layer() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let raw = vec![
        kline(1_722_384_000_000, "142.5"), // 2024-07-31
        kline(1_722_470_400_000, "143.5"), // 2024-08-01
        kline(1_722_556_800_000, "144.5"), // 2024-08-02
    ];

    let mut summary = RunSummary::new("full");
    pipeline.load_klines(&raw, &mut summary).unwrap();

    assert_eq!(summary.rows_for(stages::BRONZE), 3);
    assert_eq!(summary.rows_for(stages::SILVER), 3);
    assert_eq!(summary.rows_for(stages::GOLD), 2);

    let silver = table(&pipeline, Layer::Silver, Dataset::Klines);
    assert_eq!(silver.num_rows(), 3);
    assert_eq!(silver.partition_columns(), &["date".to_string()]);
    let gold = table(&pipeline, Layer::Gold, Dataset::Klines);
    assert_eq!(gold.num_rows(), 2);
}

#[test]
fn test_reloading_same_window_keeps_silver_version() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let raw = vec![kline(1_722_384_000_000, "142.5"), kline(1_722_470_400_000, "143.5")];

    pipeline
        .load_klines(&raw, &mut RunSummary::new("full"))
        .unwrap();
    let before = table(&pipeline, Layer::Silver, Dataset::Klines).version();

    let mut summary = RunSummary::new("full");
    pipeline.load_klines(&raw, &mut summary).unwrap();

    assert_eq!(summary.rows_for(stages::SILVER), 0);
    let silver = table(&pipeline, Layer::Silver, Dataset::Klines);
    assert_eq!(silver.version(), before);
    assert_eq!(silver.num_rows(), 2);
}

#[tokio::test]
async fn test_incremental_run_fetches_promotes_and_summarizes() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(200, false).unwrap();

    let source = MockTradeSource::new();
    source.push_ids(&[201, 205, 203]);
    let summary = pipeline.run_incremental_with(source).await.unwrap();

    assert_eq!(summary.rows_for(stages::EXTRACT), 3);
    assert_eq!(summary.rows_for(stages::SILVER), 3);
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(205));

    let bronze = table(&pipeline, Layer::Bronze, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&bronze), vec![201, 203, 205]);
    let silver = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&silver), vec![201, 203, 205]);

    // All three mock trades fall on 2024-07-31
    let gold = table(&pipeline, Layer::Gold, Dataset::HistoricalTrades).scan().unwrap();
    assert_eq!(gold.num_rows(), 1);
    let counts = gold
        .column_by_name("count_id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 3);
}

#[tokio::test]
async fn test_second_incremental_run_only_adds_new_ids() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(200, false).unwrap();

    let first = MockTradeSource::new();
    first.push_ids(&[201, 202]);
    pipeline.run_incremental_with(first).await.unwrap();

    let second = MockTradeSource::new();
    second.push_ids(&[203, 204]);
    pipeline.run_incremental_with(second).await.unwrap();

    let silver = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&silver), vec![201, 202, 203, 204]);
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(204));

    // Nothing new upstream: checkpoint and tables stay put
    let version = silver.version();
    pipeline
        .run_incremental_with(MockTradeSource::new())
        .await
        .unwrap();
    assert_eq!(
        table(&pipeline, Layer::Silver, Dataset::HistoricalTrades).version(),
        version
    );
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(204));
}

#[tokio::test]
async fn test_repeated_promotion_is_noop() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(100, false).unwrap();

    let source = MockTradeSource::new();
    source.push_ids(&[101, 102, 103]);
    pipeline.run_incremental_with(source).await.unwrap();
    let version = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades).version();

    // Rewind previous_id as if the promote checkpoint write had been lost
    CheckpointStore::new(pipeline.config().checkpoint_path())
        .write(&CheckpointRecord {
            previous_id: 100,
            last_id: 103,
        })
        .unwrap();

    let summary = pipeline.run_promote().unwrap();
    assert_eq!(summary.rows_for(stages::SILVER), 0);
    let silver = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    assert_eq!(silver.version(), version);
    assert_eq!(sorted_ids(&silver), vec![101, 102, 103]);
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(103));
}

#[tokio::test]
async fn test_unpromoted_rows_survive_next_fetch() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(100, false).unwrap();

    let blocked = block_table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    let first = MockTradeSource::new();
    first.push_ids(&[101, 102]);
    assert!(pipeline.run_incremental_with(first).await.is_err());

    // Bronze holds the batch, silver never saw it
    assert_eq!(
        checkpoint(&pipeline),
        CheckpointRecord {
            previous_id: 100,
            last_id: 102,
        }
    );
    let bronze = table(&pipeline, Layer::Bronze, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&bronze), vec![101, 102]);

    std::fs::remove_file(blocked).unwrap();
    let second = MockTradeSource::new();
    second.push_ids(&[103, 104]);
    let summary = pipeline.run_incremental_with(second).await.unwrap();

    assert_eq!(summary.rows_for(stages::SILVER), 4);
    let silver = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&silver), vec![101, 102, 103, 104]);
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(104));
    assert_eq!(daily_count(&pipeline), 4);
}

#[tokio::test]
async fn test_failed_gold_rebuild_is_retried_by_promote() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(200, false).unwrap();

    let blocked = block_table(&pipeline, Layer::Gold, Dataset::HistoricalTrades);
    let source = MockTradeSource::new();
    source.push_ids(&[201, 202]);
    assert!(pipeline.run_incremental_with(source).await.is_err());

    // Silver is current but the checkpoint still marks the rows as pending
    let silver = table(&pipeline, Layer::Silver, Dataset::HistoricalTrades);
    assert_eq!(sorted_ids(&silver), vec![201, 202]);
    assert_eq!(
        checkpoint(&pipeline),
        CheckpointRecord {
            previous_id: 200,
            last_id: 202,
        }
    );

    std::fs::remove_file(blocked).unwrap();
    let summary = pipeline.run_promote().unwrap();

    assert_eq!(summary.rows_for(stages::SILVER), 0);
    assert_eq!(summary.rows_for(stages::GOLD), 1);
    assert_eq!(daily_count(&pipeline), 2);
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(202));
}

#[tokio::test]
async fn test_failed_fetch_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.init_checkpoint(200, false).unwrap();

    let source = MockTradeSource::new();
    source.push_failure("HTTP 429: too many requests");
    let err = pipeline.run_incremental_with(source).await.unwrap_err();

    assert!(matches!(err, AppError::Extract(ExtractError::FetchFailed(_))));
    assert_eq!(checkpoint(&pipeline), CheckpointRecord::seed(200));
    assert!(VersionedTable::open(
        pipeline
            .config()
            .table_path(Layer::Bronze, Dataset::HistoricalTrades)
    )
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn test_incremental_requires_checkpoint() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let err = pipeline
        .run_incremental_with(MockTradeSource::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Extract(ExtractError::CheckpointNotInitialized(_))
    ));
}

#[test]
fn test_profile_writes_json_report() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline
        .load_klines(
            &[kline(1_722_384_000_000, "142.5")],
            &mut RunSummary::new("full"),
        )
        .unwrap();

    let path = pipeline.profile(Layer::Silver, Dataset::Klines).unwrap();
    assert!(path.starts_with(pipeline.config().report_dir()));

    let report: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(report["num_rows"], 1);
    assert!(report["columns"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["name"] == "open_time"));
}

#[test]
fn test_profile_missing_table() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        pipeline(&dir).profile(Layer::Gold, Dataset::HistoricalTrades),
        Err(AppError::TableNotFound(_))
    ));
}
