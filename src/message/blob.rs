//! Blob - a batch of events plus positional and outcome metadata

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event an output adapter could not deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEvent {
    /// 0-based index into the blob's `events` as they were when sent
    pub index: usize,
    /// The original event
    pub event: Value,
    /// Why delivery failed
    pub error_code: ErrorCode,
}

impl FailedEvent {
    pub fn new(index: usize, event: Value, error_code: ErrorCode) -> Self {
        Self {
            index,
            event,
            error_code,
        }
    }
}

/// Batch of events read from (or re-read for) one source range
///
/// Input adapters create blobs; output adapters take them by value, append to
/// `failed_events` and `reports`, and hand them back. A blob is never shared
/// between two orchestration loops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    /// Events in source order
    pub events: Vec<Value>,
    /// Identifier of the source range (file path, table shard, ...)
    pub location: String,
    /// Offset of the first event within `location`
    pub position: u64,
    /// Rows this blob accounts for; defaults to `events.len()`
    pub num_rows: usize,
    /// Events the output adapter could not deliver
    pub failed_events: Vec<FailedEvent>,
    /// Destination-specific diagnostics appended by the output adapter
    pub reports: Vec<Value>,
    /// Source position of each event when they are not contiguous from
    /// `position` (blobs rebuilt from the ledger); empty otherwise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_positions: Vec<u64>,
}

impl Blob {
    /// Create a fresh blob; `num_rows` is taken from the event count
    pub fn new(events: Vec<Value>, location: impl Into<String>, position: u64) -> Self {
        let num_rows = events.len();
        Self {
            events,
            location: location.into(),
            position,
            num_rows,
            failed_events: Vec::new(),
            reports: Vec::new(),
            source_positions: Vec::new(),
        }
    }

    /// Rebuild a blob from events scattered over `location`
    ///
    /// Each event is paired with its source position; the blob's own `position`
    /// is the smallest of them.
    pub fn from_scattered(location: impl Into<String>, events: Vec<(u64, Value)>) -> Self {
        let position = events.iter().map(|(p, _)| *p).min().unwrap_or(0);
        let (source_positions, events): (Vec<u64>, Vec<Value>) = events.into_iter().unzip();
        Self {
            source_positions,
            ..Self::new(events, location, position)
        }
    }

    /// Override the row count, e.g. when the source range held rows that were
    /// filtered out before reaching `events`
    pub fn with_num_rows(mut self, num_rows: usize) -> Self {
        self.num_rows = num_rows;
        self
    }

    /// A blob without events is never sent
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Record one undelivered event
    pub fn append_failed_event(&mut self, index: usize, event: Value, error_code: ErrorCode) {
        self.failed_events
            .push(FailedEvent::new(index, event, error_code));
    }

    /// Record several undelivered events at once
    pub fn append_failed_events(&mut self, failed: Vec<FailedEvent>) {
        if failed.is_empty() {
            return;
        }
        self.failed_events.extend(failed);
    }

    /// Append destination diagnostics
    pub fn extend_reports(&mut self, reports: Vec<Value>) {
        if reports.is_empty() {
            return;
        }
        self.reports.extend(reports);
    }

    /// Mark every event of the blob as failed with the same code
    pub fn fail_all(&mut self, error_code: ErrorCode) {
        let failed = self
            .events
            .iter()
            .enumerate()
            .map(|(index, event)| FailedEvent::new(index, event.clone(), error_code))
            .collect();
        self.append_failed_events(failed);
    }

    /// Absolute source position of the event at `index`
    pub fn source_position(&self, index: usize) -> u64 {
        match self.source_positions.get(index) {
            Some(position) => *position,
            None => self.position + index as u64,
        }
    }
}
