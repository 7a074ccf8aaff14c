//! Storage layers and the datasets that flow through them.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Medallion storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Raw API payloads.
    Bronze,
    /// Cleaned and type-cast rows.
    Silver,
    /// Aggregated summaries.
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(Layer::Bronze),
            "silver" => Ok(Layer::Silver),
            "gold" => Ok(Layer::Gold),
            other => Err(CoreError::UnknownLayer(other.to_string())),
        }
    }
}

/// Exchange dataset extracted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// `api/v3/klines`, extracted in full for a configured time range.
    Klines,
    /// `api/v3/historicalTrades`, extracted incrementally by trade id.
    HistoricalTrades,
}

impl Dataset {
    /// Directory segment used under each layer.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Dataset::Klines => "klines",
            Dataset::HistoricalTrades => "historicalTrades",
        }
    }
}
