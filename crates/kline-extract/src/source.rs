//! Record source seam for incremental extraction.

use crate::error::{ExtractError, ExtractResult};
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Anything that returns records with id strictly greater than a cursor.
pub trait TradeSource: Send + Sync {
    /// Fetch the records following `after_id`. Order is not guaranteed.
    fn fetch(&self, after_id: u64) -> BoxFuture<'_, ExtractResult<Vec<Record>>>;
}

/// Scripted source for tests and dry runs.
///
/// Each `fetch` pops the next queued response; an exhausted queue returns an
/// empty batch.
#[derive(Debug, Default)]
pub struct MockTradeSource {
    responses: Mutex<VecDeque<Result<Vec<u64>, String>>>,
    calls: Mutex<Vec<u64>>,
}

impl MockTradeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch holding records with these ids.
    pub fn push_ids(&self, ids: &[u64]) {
        self.responses.lock().push_back(Ok(ids.to_vec()));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.responses.lock().push_back(Err(reason.into()));
    }

    /// Cursors passed to `fetch`, in call order.
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().clone()
    }
}

/// Epoch ms of the first mock trade (2024-07-31T00:00:00Z).
const MOCK_EPOCH_MS: u64 = 1_722_384_000_000;

fn record(id: u64) -> Record {
    let price = format!("{}.0", 100 + id % 50);
    let mut payload = serde_json::Map::new();
    payload.insert("id".to_string(), id.into());
    payload.insert("price".to_string(), price.clone().into());
    payload.insert("qty".to_string(), "1.0".into());
    payload.insert("quoteQty".to_string(), price.into());
    payload.insert("time".to_string(), (MOCK_EPOCH_MS + id * 60_000).into());
    payload.insert("isBuyerMaker".to_string(), (id % 2 == 0).into());
    Record { id, payload }
}

impl TradeSource for MockTradeSource {
    fn fetch(&self, after_id: u64) -> BoxFuture<'_, ExtractResult<Vec<Record>>> {
        self.calls.lock().push(after_id);
        let next = self.responses.lock().pop_front();
        Box::pin(async move {
            match next {
                None => Ok(Vec::new()),
                Some(Ok(ids)) => Ok(ids.into_iter().map(record).collect()),
                Some(Err(reason)) => Err(ExtractError::FetchFailed(reason)),
            }
        })
    }
}
