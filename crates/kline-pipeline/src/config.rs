//! Pipeline configuration.

use crate::error::{AppError, AppResult};
use kline_core::time::parse_epoch_ms;
use kline_core::{Dataset, Layer};
use kline_extract::KlineRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Binance allows at most 1000 rows per klines or trades request.
const MAX_LIMIT: u32 = 1000;

/// REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_klines_endpoint")]
    pub klines_endpoint: String,
    #[serde(default = "default_trades_endpoint")]
    pub trades_endpoint: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Kline interval (e.g., "1d", "4h").
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Start of the full-extraction window, RFC3339 or "YYYY-MM-DD HH:MM:SSZ".
    #[serde(default = "default_start_time")]
    pub start_time: String,
    /// End of the full-extraction window, same formats as `start_time`.
    #[serde(default = "default_end_time")]
    pub end_time: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Page size for `historicalTrades`.
    #[serde(default = "default_limit")]
    pub trades_limit: u32,
    /// Environment variable holding the API key. No key header when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_klines_endpoint() -> String {
    "api/v3/klines".to_string()
}

fn default_trades_endpoint() -> String {
    "api/v3/historicalTrades".to_string()
}

fn default_symbol() -> String {
    "SOLUSDT".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_start_time() -> String {
    "2024-07-31T00:00:00Z".to_string()
}

fn default_end_time() -> String {
    "2025-07-31T23:59:59Z".to_string()
}

fn default_limit() -> u32 {
    MAX_LIMIT
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            klines_endpoint: default_klines_endpoint(),
            trades_endpoint: default_trades_endpoint(),
            symbol: default_symbol(),
            interval: default_interval(),
            start_time: default_start_time(),
            end_time: default_end_time(),
            limit: default_limit(),
            trades_limit: default_limit(),
            api_key_env: None,
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the bronze/silver/gold directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Directory segment naming the upstream API.
    #[serde(default = "default_source_name")]
    pub source_name: String,
    /// Profile report directory. Defaults to `<data_dir>/reports`.
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("metadata/incremental.json")
}

fn default_source_name() -> String {
    "api_binance".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            checkpoint_path: default_checkpoint_path(),
            source_name: default_source_name(),
            report_dir: None,
        }
    }
}

/// Stage options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Partition columns for silver tables.
    #[serde(default = "default_partition_columns")]
    pub partition_columns: Vec<String>,
    /// Key column of silver klines.
    #[serde(default = "default_kline_key")]
    pub kline_key: String,
    /// Key column of trades in bronze and silver.
    #[serde(default = "default_trade_key")]
    pub trade_key: String,
}

fn default_partition_columns() -> Vec<String> {
    vec!["date".to_string()]
}

fn default_kline_key() -> String {
    "open_time".to_string()
}

fn default_trade_key() -> String {
    "id".to_string()
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            partition_columns: default_partition_columns(),
            kline_key: default_kline_key(),
            trade_key: default_trade_key(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: StageConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let request = self.kline_request()?;
        if request.start_time > request.end_time {
            return Err(AppError::Config(format!(
                "start_time {} is after end_time {}",
                self.api.start_time, self.api.end_time
            )));
        }
        for (name, limit) in [("limit", self.api.limit), ("trades_limit", self.api.trades_limit)] {
            if limit == 0 || limit > MAX_LIMIT {
                return Err(AppError::Config(format!(
                    "{name} must be between 1 and {MAX_LIMIT}, got {limit}"
                )));
            }
        }
        if self.api.symbol.is_empty() {
            return Err(AppError::Config("symbol must not be empty".to_string()));
        }
        Ok(())
    }

    /// Klines request for the configured window.
    pub fn kline_request(&self) -> AppResult<KlineRequest> {
        let parse = |field: &str, value: &str| {
            parse_epoch_ms(value).map_err(|e| AppError::Config(format!("{field}: {e}")))
        };
        Ok(KlineRequest {
            symbol: self.api.symbol.clone(),
            interval: self.api.interval.clone(),
            start_time: parse("start_time", &self.api.start_time)?,
            end_time: parse("end_time", &self.api.end_time)?,
            limit: self.api.limit,
        })
    }

    /// API key from the configured environment variable, if any.
    pub fn api_key(&self) -> Option<String> {
        self.api
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }

    /// `<data_dir>/<layer>/<source>/<dataset>/<symbol>` for bronze and silver,
    /// with a `summarized_table` segment before the symbol for gold.
    pub fn table_path(&self, layer: Layer, dataset: Dataset) -> PathBuf {
        let mut path = self
            .paths
            .data_dir
            .join(layer.as_str())
            .join(&self.paths.source_name)
            .join(dataset.dir_name());
        if layer == Layer::Gold {
            path.push("summarized_table");
        }
        path.join(self.api.symbol.to_lowercase())
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.paths.checkpoint_path
    }

    pub fn report_dir(&self) -> PathBuf {
        self.paths
            .report_dir
            .clone()
            .unwrap_or_else(|| self.paths.data_dir.join("reports"))
    }
}
