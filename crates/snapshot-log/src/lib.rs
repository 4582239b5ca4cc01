//! Snapshot Log
//!
//! Keeps recent poll snapshots in memory, addressable by timestamp and
//! metric name, and exports them as CSV.

mod export;
mod store;

pub use export::write_csv;
pub use store::{SnapshotLog, DEFAULT_RETENTION};

use thiserror::Error;

/// Snapshot log errors
#[derive(Debug, Error)]
pub enum SnapshotLogError {
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("No snapshot at {0}")]
    NotFound(String),
    #[error("Metric {0:?} was not polled")]
    UnknownMetric(String),
    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
}
