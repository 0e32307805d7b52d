//! Monitoring ledger: durable per-blob progress and per-event failure records.
//!
//! The ledger has two halves:
//! - [`LedgerStore`]: the storage backend (append rows, select by DAG, delete by age)
//! - [`MonitoringLedger`]: the operations the data connector performs against it
//!
//! Backends are selected from `MonitoringSettings::connection_id` by [`open_ledger_store`]:
//! - `memory` - a fresh in-process store
//! - `memory://<name>` - a named in-process store shared by every opener in the process
//! - `sqlite://<path>` or a bare path - a SQLite database file

mod memory_store;
mod monitoring;
mod sqlite_store;

pub use memory_store::MemoryLedgerStore;
pub use monitoring::MonitoringLedger;
pub use sqlite_store::SqliteLedgerStore;

use crate::{ConnectorError, ConnectorResult, ErrorCode, MonitoringSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// "This much of this source range has been read and dispatched"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobProgressRecord {
    pub dag_name: String,
    pub location: String,
    pub position: u64,
    pub num_rows: usize,
    pub timestamp: DateTime<Utc>,
}

/// One event that could not be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEventRecord {
    pub dag_name: String,
    pub timestamp: DateTime<Utc>,
    pub error_code: ErrorCode,
    pub location: String,
    /// Absolute position of the event within `location`
    pub position: u64,
    /// The event serialized as JSON
    pub payload: String,
}

/// Rows removed by a cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub blobs_deleted: usize,
    pub events_deleted: usize,
}

/// Storage backend of the monitoring ledger
///
/// Rows are append-only; the only deletion is the age-based sweep.
pub trait LedgerStore: Send + Sync {
    /// Append one progress record
    fn append_blob_record(&self, record: &BlobProgressRecord) -> ConnectorResult<()>;

    /// Append failed-event records; an empty slice is a no-op
    fn append_failed_events(&self, records: &[FailedEventRecord]) -> ConnectorResult<()>;

    /// Every progress record of `dag_name`
    fn blob_records(&self, dag_name: &str) -> ConnectorResult<Vec<BlobProgressRecord>>;

    /// Every failed-event record of `dag_name`
    fn failed_event_records(&self, dag_name: &str) -> ConnectorResult<Vec<FailedEventRecord>>;

    /// Delete every record, of any DAG, whose timestamp is before `cutoff`
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> ConnectorResult<CleanupSummary>;
}

/// Open the ledger backend named by `settings.connection_id`
///
/// # Errors
///
/// `ConnectorError::MonitoringValue` when dataset, table or connection id is
/// missing; `ConnectorError::Ledger` when the backend cannot be opened.
pub fn open_ledger_store(settings: &MonitoringSettings) -> ConnectorResult<Arc<dyn LedgerStore>> {
    settings.validate()?;

    let (dataset, table, connection_id) = match (
        settings.dataset.as_deref(),
        settings.table.as_deref(),
        settings.connection_id.as_deref(),
    ) {
        (Some(d), Some(t), Some(c)) => (d.trim(), t.trim(), c.trim()),
        _ => {
            return Err(ConnectorError::monitoring_value(
                "dataset, table and connection_id are required",
            ))
        }
    };

    if connection_id == "memory" {
        return Ok(Arc::new(MemoryLedgerStore::new()));
    }
    if let Some(name) = connection_id.strip_prefix("memory://") {
        let store: Arc<dyn LedgerStore> =
            MemoryLedgerStore::shared(&format!("{name}/{dataset}/{table}"));
        return Ok(store);
    }

    let path = connection_id
        .strip_prefix("sqlite://")
        .unwrap_or(connection_id);
    let store = SqliteLedgerStore::open(path, dataset, table)?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_monitoring_values() {
        let settings = MonitoringSettings {
            connection_id: None,
            ..MonitoringSettings::new("tcrm", "monitoring", "memory")
        };
        let err = open_ledger_store(&settings).err().unwrap();
        assert!(matches!(err, ConnectorError::MonitoringValue(_)));
    }

    #[test]
    fn test_open_named_memory_store_is_shared() {
        let settings = MonitoringSettings::new("tcrm", "monitoring", "memory://ledger-mod-test");
        let a = open_ledger_store(&settings).unwrap();
        let b = open_ledger_store(&settings).unwrap();

        a.append_blob_record(&BlobProgressRecord {
            dag_name: "dag".to_string(),
            location: "loc".to_string(),
            position: 0,
            num_rows: 1,
            timestamp: Utc::now(),
        })
        .unwrap();

        assert_eq!(b.blob_records("dag").unwrap().len(), 1);

        let fresh = open_ledger_store(&MonitoringSettings::new("tcrm", "monitoring", "memory")).unwrap();
        assert!(fresh.blob_records("dag").unwrap().is_empty());
    }

    #[test]
    fn test_open_sqlite_in_memory() {
        let settings = MonitoringSettings::new("tcrm", "monitoring", "sqlite://:memory:");
        let store = open_ledger_store(&settings).unwrap();
        assert!(store.failed_event_records("dag").unwrap().is_empty());
    }
}
