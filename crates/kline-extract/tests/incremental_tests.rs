//! Fetch-cycle behaviour against a scripted source.

use kline_extract::{
    mark_promoted, CheckpointRecord, CheckpointStore, ExtractError, FetchOutcome,
    IncrementalFetcher, MockTradeSource,
};
use tempfile::TempDir;

fn seeded(dir: &TempDir, previous_id: u64, last_id: u64) -> CheckpointStore {
    let store = CheckpointStore::new(dir.path().join("incremental.json"));
    store
        .write(&CheckpointRecord {
            previous_id,
            last_id,
        })
        .unwrap();
    store
}

fn checkpoint_bytes(store: &CheckpointStore) -> Vec<u8> {
    std::fs::read(store.path()).unwrap()
}

#[tokio::test]
async fn test_cycle_advances_to_batch_max() {
    let dir = TempDir::new().unwrap();
    let source = MockTradeSource::new();
    source.push_ids(&[201, 205, 203]);
    let fetcher = IncrementalFetcher::new(seeded(&dir, 100, 200), source);

    let FetchOutcome::Pending(cycle) = fetcher.begin().await.unwrap() else {
        panic!("expected a pending cycle");
    };
    let ids: Vec<u64> = cycle.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![201, 205, 203]);

    // Nothing is written before the caller commits
    assert_eq!(
        fetcher.store().read().unwrap(),
        Some(CheckpointRecord {
            previous_id: 100,
            last_id: 200
        })
    );

    let committed = cycle.commit().unwrap();
    let expected = CheckpointRecord {
        previous_id: 200,
        last_id: 205,
    };
    assert_eq!(committed, expected);
    assert_eq!(fetcher.store().read().unwrap(), Some(expected));
    assert_eq!(fetcher.source().calls(), vec![200]);
}

#[tokio::test]
async fn test_non_monotonic_batch_leaves_checkpoint() {
    let dir = TempDir::new().unwrap();
    let source = MockTradeSource::new();
    source.push_ids(&[150, 180]);
    let fetcher = IncrementalFetcher::new(seeded(&dir, 100, 200), source);
    let before = checkpoint_bytes(fetcher.store());

    let err = fetcher.begin().await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::NonMonotonicBatch {
            last_id: 200,
            batch_max: 180
        }
    ));
    assert_eq!(checkpoint_bytes(fetcher.store()), before);
}

#[tokio::test]
async fn test_failed_fetch_leaves_checkpoint_bytes() {
    let dir = TempDir::new().unwrap();
    let source = MockTradeSource::new();
    source.push_failure("HTTP 503");
    let fetcher = IncrementalFetcher::new(seeded(&dir, 100, 200), source);
    let before = checkpoint_bytes(fetcher.store());

    let err = fetcher.begin().await.unwrap_err();
    assert!(matches!(err, ExtractError::FetchFailed(_)));
    assert_eq!(checkpoint_bytes(fetcher.store()), before);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let dir = TempDir::new().unwrap();
    let fetcher = IncrementalFetcher::new(seeded(&dir, 100, 200), MockTradeSource::new());
    let before = checkpoint_bytes(fetcher.store());

    match fetcher.begin().await.unwrap() {
        FetchOutcome::Empty(current) => assert_eq!(current.last_id, 200),
        FetchOutcome::Pending(_) => panic!("expected no records"),
    }
    assert_eq!(checkpoint_bytes(fetcher.store()), before);
}

#[tokio::test]
async fn test_uncommitted_cycle_refetches_same_window() {
    let dir = TempDir::new().unwrap();
    let source = MockTradeSource::new();
    source.push_ids(&[201, 202]);
    source.push_ids(&[201, 202]);
    let fetcher = IncrementalFetcher::new(seeded(&dir, 100, 200), source);

    // Simulates a crash between persistence and commit
    match fetcher.begin().await.unwrap() {
        FetchOutcome::Pending(cycle) => drop(cycle),
        FetchOutcome::Empty(_) => panic!("expected records"),
    }
    match fetcher.begin().await.unwrap() {
        FetchOutcome::Pending(cycle) => {
            cycle.commit().unwrap();
        }
        FetchOutcome::Empty(_) => panic!("expected records"),
    }

    assert_eq!(fetcher.source().calls(), vec![200, 200]);
    assert_eq!(fetcher.store().read().unwrap().unwrap().last_id, 202);
}

#[tokio::test]
async fn test_absent_checkpoint_is_not_initialized() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("missing.json"));
    let source = MockTradeSource::new();
    source.push_ids(&[1]);
    let fetcher = IncrementalFetcher::new(store, source);

    assert!(matches!(
        fetcher.begin().await.unwrap_err(),
        ExtractError::CheckpointNotInitialized(_)
    ));
    assert!(fetcher.source().calls().is_empty());
}

#[test]
fn test_mark_promoted() {
    let dir = TempDir::new().unwrap();
    let store = seeded(&dir, 200, 205);

    assert_eq!(mark_promoted(&store).unwrap(), CheckpointRecord::seed(205));
    assert_eq!(store.read().unwrap(), Some(CheckpointRecord::seed(205)));
}
