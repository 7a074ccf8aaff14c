//! Structured logging and per-stage run timing for the K-line pipeline.

pub mod error;
pub mod logging;
pub mod stage;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use stage::{RunSummary, StageReport, StageTimer};
