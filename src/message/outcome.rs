//! BlobOutcome - per-blob entry of a run report

use crate::Blob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to one sent blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobOutcome {
    pub location: String,
    pub position: u64,
    pub num_rows: usize,
    /// Number of events the output adapter could not deliver
    pub failed_events: usize,
    /// Diagnostics the output adapter attached to the blob
    pub reports: Vec<Value>,
}

impl From<&Blob> for BlobOutcome {
    fn from(blob: &Blob) -> Self {
        Self {
            location: blob.location.clone(),
            position: blob.position,
            num_rows: blob.num_rows,
            failed_events: blob.failed_events.len(),
            reports: blob.reports.clone(),
        }
    }
}

impl BlobOutcome {
    /// Events of the blob that reached the destination
    pub fn delivered(&self) -> usize {
        self.num_rows.saturating_sub(self.failed_events)
    }
}
