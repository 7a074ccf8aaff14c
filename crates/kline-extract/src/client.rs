//! HTTP client for the Binance spot REST API.
//!
//! One attempt per request. Transport errors, non-success statuses and
//! undecodable bodies all surface as `FetchFailed`.

use crate::error::{ExtractError, ExtractResult};
use crate::record::Record;
use crate::source::{BoxFuture, TradeSource};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Parameters for a klines window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: String,
    /// Epoch ms, inclusive.
    pub start_time: i64,
    /// Epoch ms, inclusive.
    pub end_time: i64,
    pub limit: u32,
}

impl KlineRequest {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.clone()),
            ("startTime", self.start_time.to_string()),
            ("endTime", self.end_time.to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BinanceClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://api.binance.com")
    /// * `api_key` - sent as `X-MBX-APIKEY` when present
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> ExtractResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::FetchFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// GET `{base_url}/{endpoint}` and decode the JSON body.
    ///
    /// With `data_field`, the body must be an object and that field is returned.
    pub async fn get_data(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        data_field: Option<&str>,
    ) -> ExtractResult<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, params = ?params, "GET");

        let mut request = self.client.get(&url).query(params);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractError::FetchFailed(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::FetchFailed(format!("HTTP {status}: {body}")));
        }
        info!(url = %url, status = status.as_u16(), "API response received");

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractError::FetchFailed(format!("Failed to parse response: {e}")))?;

        match data_field {
            None => Ok(body),
            Some(field) => body.get(field).cloned().ok_or_else(|| {
                ExtractError::FetchFailed(format!("Response has no field '{field}'"))
            }),
        }
    }

    /// Fetch one klines window. Each element is a 12-element array.
    pub async fn fetch_klines(
        &self,
        endpoint: &str,
        request: &KlineRequest,
    ) -> ExtractResult<Vec<Value>> {
        let body = self.get_data(endpoint, &request.params(), None).await?;
        into_array(body)
    }

    /// Fetch trades with id `>= from_id`.
    pub async fn fetch_trades(
        &self,
        endpoint: &str,
        symbol: &str,
        from_id: u64,
        limit: u32,
    ) -> ExtractResult<Vec<Record>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("fromId", from_id.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get_data(endpoint, &params, None).await?;
        into_array(body)?.into_iter().map(Record::try_from).collect()
    }
}

fn into_array(body: Value) -> ExtractResult<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        other => Err(ExtractError::InvalidResponse(format!(
            "expected a JSON array, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `historicalTrades` as a [`TradeSource`].
pub struct HistoricalTrades {
    client: BinanceClient,
    endpoint: String,
    symbol: String,
    limit: u32,
}

impl HistoricalTrades {
    pub fn new(
        client: BinanceClient,
        endpoint: impl Into<String>,
        symbol: impl Into<String>,
        limit: u32,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            symbol: symbol.into(),
            limit,
        }
    }
}

impl TradeSource for HistoricalTrades {
    fn fetch(&self, after_id: u64) -> BoxFuture<'_, ExtractResult<Vec<Record>>> {
        Box::pin(async move {
            self.client
                .fetch_trades(&self.endpoint, &self.symbol, after_id.saturating_add(1), self.limit)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_slashes() {
        let client = BinanceClient::new("https://api.binance.com/", None).unwrap();
        assert_eq!(
            client.endpoint_url("/api/v3/klines"),
            "https://api.binance.com/api/v3/klines"
        );
        assert_eq!(
            client.endpoint_url("api/v3/historicalTrades"),
            "https://api.binance.com/api/v3/historicalTrades"
        );
    }

    #[test]
    fn test_kline_params() {
        let request = KlineRequest {
            symbol: "SOLUSDT".to_string(),
            interval: "1d".to_string(),
            start_time: 1_722_384_000_000,
            end_time: 1_754_006_399_000,
            limit: 1000,
        };
        let params = request.params();
        assert_eq!(params[0], ("symbol", "SOLUSDT".to_string()));
        assert_eq!(params[2], ("startTime", "1722384000000".to_string()));
        assert_eq!(params[4], ("limit", "1000".to_string()));
    }

    #[test]
    fn test_into_array_rejects_objects() {
        let err = into_array(serde_json::json!({"code": -1121})).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_failed() {
        // Port 9 on loopback is discard; nothing listens there in CI
        let client = BinanceClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.get_data("api/v3/klines", &[], None).await.unwrap_err();
        assert!(matches!(err, ExtractError::FetchFailed(_)));
    }
}
