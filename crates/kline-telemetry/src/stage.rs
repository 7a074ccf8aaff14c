//! Stage timing for a pipeline run.
//!
//! Each stage logs when it starts and when it finishes, with row counts and
//! elapsed time. The collected [`RunSummary`] is logged once at the end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub rows: usize,
    pub elapsed_ms: u128,
}

/// Timer for one stage. Call [`finish`](Self::finish) on success or
/// [`fail`](Self::fail) with the error.
#[derive(Debug)]
pub struct StageTimer {
    stage: String,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: impl Into<String>) -> Self {
        let stage = stage.into();
        info!(stage = %stage, "Stage started");
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn finish(self, rows: usize) -> StageReport {
        let elapsed_ms = self.started.elapsed().as_millis();
        info!(stage = %self.stage, rows, elapsed_ms, "Stage completed");
        StageReport {
            stage: self.stage,
            rows,
            elapsed_ms,
        }
    }

    pub fn fail(self, err: &dyn std::fmt::Display) {
        error!(
            stage = %self.stage,
            elapsed_ms = self.started.elapsed().as_millis(),
            error = %err,
            "Stage failed"
        );
    }
}

/// Stages completed in one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            started_at: Utc::now(),
            stages: Vec::new(),
        }
    }

    pub fn record(&mut self, report: StageReport) {
        self.stages.push(report);
    }

    /// Total rows across stages named `stage`.
    pub fn rows_for(&self, stage: &str) -> usize {
        self.stages
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.rows)
            .sum()
    }

    pub fn log(&self) {
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(
            mode = %self.mode,
            stages = self.stages.len(),
            elapsed_ms,
            "Pipeline completed"
        );
    }
}
