//! Ledger operations performed by the data connector

use super::{open_ledger_store, BlobProgressRecord, CleanupSummary, FailedEventRecord, LedgerStore};
use crate::{Blob, ConnectorResult, MonitoringSettings, ProcessedRanges};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Monitoring ledger bound to one DAG
///
/// Progress records let a rerun skip ranges already dispatched; failed-event
/// records feed retry-mode runs. Both are append-only here; only
/// [`cleanup_by_days_to_live`](MonitoringLedger::cleanup_by_days_to_live) deletes.
#[derive(Clone)]
pub struct MonitoringLedger {
    store: Arc<dyn LedgerStore>,
    dag_name: String,
}

impl MonitoringLedger {
    pub fn new(store: Arc<dyn LedgerStore>, dag_name: impl Into<String>) -> Self {
        Self {
            store,
            dag_name: dag_name.into(),
        }
    }

    /// Open the backend named by `settings` and bind it to `dag_name`
    pub fn open(settings: &MonitoringSettings, dag_name: impl Into<String>) -> ConnectorResult<Self> {
        let store = open_ledger_store(settings)?;
        Ok(Self::new(store, dag_name))
    }

    pub fn dag_name(&self) -> &str {
        &self.dag_name
    }

    /// Every `(location, position)` already dispatched for this DAG
    pub fn generate_processed_blobs_ranges(&self) -> ConnectorResult<ProcessedRanges> {
        let ranges: ProcessedRanges = self
            .store
            .blob_records(&self.dag_name)?
            .into_iter()
            .map(|record| (record.location, record.position))
            .collect();
        debug!(
            "Loaded {} processed range(s) for dag {}",
            ranges.len(),
            self.dag_name
        );
        Ok(ranges)
    }

    /// Record that the blob at `(location, position)` was dispatched
    ///
    /// Call only after the output adapter returned, so a crash mid-send never
    /// marks an undelivered range as processed.
    pub fn store_blob(&self, location: &str, position: u64, num_rows: usize) -> ConnectorResult<()> {
        self.store.append_blob_record(&BlobProgressRecord {
            dag_name: self.dag_name.clone(),
            location: location.to_string(),
            position,
            num_rows,
            timestamp: Utc::now(),
        })
    }

    /// Record one failed-event row per entry of `blob.failed_events`
    ///
    /// Positions are absolute within `blob.location`. No-op when nothing failed.
    pub fn store_events(&self, blob: &Blob) -> ConnectorResult<()> {
        if blob.failed_events.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now();
        let records = blob
            .failed_events
            .iter()
            .map(|failed| -> ConnectorResult<FailedEventRecord> {
                Ok(FailedEventRecord {
                    dag_name: self.dag_name.clone(),
                    timestamp,
                    error_code: failed.error_code,
                    location: blob.location.clone(),
                    position: blob.source_position(failed.index),
                    payload: serde_json::to_string(&failed.event)?,
                })
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        self.store.append_failed_events(&records)
    }

    /// Rebuild one blob per location from the stored failed events
    ///
    /// Events of a location are ordered by source position; the blob position is
    /// the smallest of them.
    pub fn events_blobs_generator(&self) -> ConnectorResult<impl Iterator<Item = Blob>> {
        let records = self.store.failed_event_records(&self.dag_name)?;
        info!(
            "Rebuilding blobs from {} failed event(s) for dag {}",
            records.len(),
            self.dag_name
        );

        let mut by_location: BTreeMap<String, Vec<(u64, Value)>> = BTreeMap::new();
        for record in records {
            let event = match serde_json::from_str(&record.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "Failed event at {}:{} is not valid JSON ({}), resending raw payload",
                        record.location, record.position, e
                    );
                    Value::String(record.payload)
                }
            };
            by_location
                .entry(record.location)
                .or_default()
                .push((record.position, event));
        }

        Ok(by_location.into_iter().map(|(location, mut events)| {
            events.sort_by_key(|(position, _)| *position);
            Blob::from_scattered(location, events)
        }))
    }

    /// Delete every progress and failed-event record older than `days_to_live` days
    ///
    /// Age is the only criterion: records of resolved failures are kept until
    /// they expire, and records of every DAG sharing the tables are swept.
    pub fn cleanup_by_days_to_live(&self, days_to_live: u32) -> ConnectorResult<CleanupSummary> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_to_live));
        let summary = self.store.delete_older_than(cutoff)?;
        info!(
            "Ledger cleanup older than {} day(s): {} progress record(s), {} failed event(s) deleted",
            days_to_live, summary.blobs_deleted, summary.events_deleted
        );
        Ok(summary)
    }
}
