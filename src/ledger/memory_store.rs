//! In-process ledger backend

use super::{BlobProgressRecord, CleanupSummary, FailedEventRecord, LedgerStore};
use crate::{ConnectorError, ConnectorResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Debug, Default)]
struct Tables {
    blobs: Vec<BlobProgressRecord>,
    events: Vec<FailedEventRecord>,
}

/// Ledger backend that keeps both tables in memory
///
/// Used for tests and dry runs; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    tables: Mutex<Tables>,
}

static SHARED_STORES: OnceLock<Mutex<HashMap<String, Arc<MemoryLedgerStore>>>> = OnceLock::new();

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store registered under `name`, created on first use
    pub fn shared(name: &str) -> Arc<MemoryLedgerStore> {
        let registry = SHARED_STORES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut stores = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryLedgerStore::new()))
            .clone()
    }

    fn lock(&self) -> ConnectorResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ConnectorError::ledger("memory ledger lock poisoned"))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn append_blob_record(&self, record: &BlobProgressRecord) -> ConnectorResult<()> {
        self.lock()?.blobs.push(record.clone());
        Ok(())
    }

    fn append_failed_events(&self, records: &[FailedEventRecord]) -> ConnectorResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.lock()?.events.extend_from_slice(records);
        Ok(())
    }

    fn blob_records(&self, dag_name: &str) -> ConnectorResult<Vec<BlobProgressRecord>> {
        Ok(self
            .lock()?
            .blobs
            .iter()
            .filter(|r| r.dag_name == dag_name)
            .cloned()
            .collect())
    }

    fn failed_event_records(&self, dag_name: &str) -> ConnectorResult<Vec<FailedEventRecord>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|r| r.dag_name == dag_name)
            .cloned()
            .collect())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> ConnectorResult<CleanupSummary> {
        let mut tables = self.lock()?;

        let blobs_before = tables.blobs.len();
        tables.blobs.retain(|r| r.timestamp >= cutoff);
        let events_before = tables.events.len();
        tables.events.retain(|r| r.timestamp >= cutoff);

        Ok(CleanupSummary {
            blobs_deleted: blobs_before - tables.blobs.len(),
            events_deleted: events_before - tables.events.len(),
        })
    }
}
