//! Adapter trait definitions.
//!
//! This module defines the two boundary traits a pipeline plugs into the data connector:
//! - `InputAdapter`: reads batches of events from an external data source
//! - `OutputAdapter`: delivers batches of events to an external destination

use crate::{Blob, ConnectorResult};
use async_trait::async_trait;
use std::collections::HashSet;

/// Trait for implementing Input Adapters (External Source → Blobs)
///
/// The blob sequence is pull-based: the runtime first calls
/// [`events_blobs_generator`](InputAdapter::events_blobs_generator) with the ranges the
/// ledger already holds, then calls [`next_blob`](InputAdapter::next_blob) until it
/// returns `Ok(None)`. The sequence is finite and is not restarted.
///
/// # Example
///
/// ```rust,no_run
/// use tcrm_connect_core::{Blob, ConnectorResult, InputAdapter, ProcessedRanges};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// pub struct StaticSource {
///     pending: Vec<Blob>,
/// }
///
/// #[async_trait]
/// impl InputAdapter for StaticSource {
///     fn get_location(&self) -> String {
///         "static".to_string()
///     }
///
///     async fn events_blobs_generator(&mut self, processed: ProcessedRanges) -> ConnectorResult<()> {
///         self.pending.retain(|b| !processed.contains(&b.location, b.position));
///         self.pending.reverse();
///         Ok(())
///     }
///
///     async fn next_blob(&mut self) -> ConnectorResult<Option<Blob>> {
///         Ok(self.pending.pop())
///     }
/// }
/// ```
#[async_trait]
pub trait InputAdapter: Send + Sync {
    /// Stable identifier of the whole source
    ///
    /// Used as the ledger location when no per-blob location is more specific.
    fn get_location(&self) -> String;

    /// Prepare the blob sequence, skipping every range in `processed`
    ///
    /// # Errors
    ///
    /// Return `ConnectorError::Fatal` when the source as a whole is unavailable
    /// (cannot authenticate, does not exist). A failure limited to one sub-range
    /// must not be reported here.
    async fn events_blobs_generator(&mut self, processed: ProcessedRanges) -> ConnectorResult<()>;

    /// Pull the next unprocessed blob, or `None` once the source is exhausted
    ///
    /// A read error for one sub-range is logged and that blob omitted; the
    /// ledger then shows a gap for the range rather than the run failing.
    async fn next_blob(&mut self) -> ConnectorResult<Option<Blob>>;
}

/// Trait for implementing Output Adapters (Blobs → External Destination)
///
/// # Example
///
/// ```rust,no_run
/// use tcrm_connect_core::{Blob, ConnectorResult, ErrorCode, OutputAdapter};
/// use async_trait::async_trait;
///
/// pub struct RejectStrings;
///
/// #[async_trait]
/// impl OutputAdapter for RejectStrings {
///     async fn send_events(&mut self, mut blob: Blob) -> ConnectorResult<Blob> {
///         let rejected: Vec<_> = blob
///             .events
///             .iter()
///             .enumerate()
///             .filter(|(_, e)| e.is_string())
///             .map(|(i, e)| (i, e.clone()))
///             .collect();
///         for (index, event) in rejected {
///             blob.append_failed_event(index, event, ErrorCode::InvalidEvent);
///         }
///         Ok(blob)
///     }
/// }
/// ```
#[async_trait]
pub trait OutputAdapter: Send + Sync {
    /// Attempt delivery of every event in `blob.events`
    ///
    /// Returns the same blob with `failed_events` populated for every event that
    /// was not delivered and `reports` extended with destination diagnostics.
    ///
    /// # Errors
    ///
    /// Per-event failures are never errors. Return `ConnectorError::Fatal` only for
    /// adapter-wide failures (authentication, destination permanently unreachable);
    /// this aborts the current run.
    async fn send_events(&mut self, blob: Blob) -> ConnectorResult<Blob>;
}

/// Set of `(location, position)` pairs already dispatched by earlier runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedRanges {
    ranges: HashSet<(String, u64)>,
}

impl ProcessedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched range
    pub fn insert(&mut self, location: impl Into<String>, position: u64) {
        self.ranges.insert((location.into(), position));
    }

    /// Whether the blob starting at `position` of `location` was dispatched
    pub fn contains(&self, location: &str, position: u64) -> bool {
        self.ranges.contains(&(location.to_string(), position))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, u64)> {
        self.ranges.iter()
    }
}

impl FromIterator<(String, u64)> for ProcessedRanges {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_ranges() {
        let mut ranges = ProcessedRanges::new();
        assert!(ranges.is_empty());

        ranges.insert("file.jsonl", 0);
        ranges.insert("file.jsonl", 100);
        ranges.insert("file.jsonl", 100);

        assert_eq!(ranges.len(), 2);
        assert!(ranges.contains("file.jsonl", 100));
        assert!(!ranges.contains("file.jsonl", 200));
        assert!(!ranges.contains("other.jsonl", 0));
    }

    #[test]
    fn test_processed_ranges_from_iter() {
        let ranges: ProcessedRanges = vec![("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();
        assert!(ranges.contains("a", 1));
        assert!(ranges.contains("b", 2));
    }
}
