//! SQLite ledger backend
//!
//! Each ledger lives in two tables named after the monitoring dataset and table:
//! `{dataset}_{table}_blobs` holds progress records and `{dataset}_{table}_events`
//! holds failed events. Timestamps are stored as microseconds since the epoch.

use super::{BlobProgressRecord, CleanupSummary, FailedEventRecord, LedgerStore};
use crate::{ConnectorError, ConnectorResult, ErrorCode};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Ledger backend persisted in a SQLite database
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
    blobs_table: String,
    events_table: String,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `path`; `:memory:` opens a private in-memory database
    pub fn open(path: &str, dataset: &str, table: &str) -> ConnectorResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            ConnectorError::ledger_with_source(format!("Failed to open ledger database {path}"), e)
        })?;
        Self::with_connection(conn, dataset, table)
    }

    /// Use an already opened connection
    pub fn with_connection(conn: Connection, dataset: &str, table: &str) -> ConnectorResult<Self> {
        validate_identifier("dataset", dataset)?;
        validate_identifier("table", table)?;

        let store = Self {
            conn: Mutex::new(conn),
            blobs_table: format!("{dataset}_{table}_blobs"),
            events_table: format!("{dataset}_{table}_events"),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> ConnectorResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {blobs} (
                dag_name TEXT NOT NULL,
                location TEXT NOT NULL,
                position INTEGER NOT NULL,
                num_rows INTEGER NOT NULL,
                timestamp_us INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{blobs}_dag ON {blobs}(dag_name);
            CREATE INDEX IF NOT EXISTS idx_{blobs}_ts ON {blobs}(timestamp_us);
            CREATE TABLE IF NOT EXISTS {events} (
                dag_name TEXT NOT NULL,
                timestamp_us INTEGER NOT NULL,
                error_code INTEGER NOT NULL,
                location TEXT NOT NULL,
                position INTEGER NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{events}_dag ON {events}(dag_name);
            CREATE INDEX IF NOT EXISTS idx_{events}_ts ON {events}(timestamp_us);",
            blobs = self.blobs_table,
            events = self.events_table,
        ))?;
        debug!(
            "Ledger schema ready: {}, {}",
            self.blobs_table, self.events_table
        );
        Ok(())
    }

    fn lock(&self) -> ConnectorResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ConnectorError::ledger("sqlite ledger lock poisoned"))
    }
}

fn validate_identifier(field: &str, value: &str) -> ConnectorResult<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ConnectorError::monitoring_value(format!(
            "{field} must only contain ASCII letters, digits and '_': {value:?}"
        )));
    }
    Ok(())
}

/// Values wider than a SQLite INTEGER are rejected, never wrapped
fn to_sql_int<T>(field: &str, value: T) -> ConnectorResult<i64>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        ConnectorError::ledger(format!("{field} {value} does not fit in a SQLite INTEGER"))
    })
}

fn from_sql_int<T: TryFrom<i64>>(idx: usize, value: i64) -> rusqlite::Result<T> {
    T::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

impl LedgerStore for SqliteLedgerStore {
    fn append_blob_record(&self, record: &BlobProgressRecord) -> ConnectorResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (dag_name, location, position, num_rows, timestamp_us)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.blobs_table
            ),
            params![
                record.dag_name,
                record.location,
                to_sql_int("position", record.position)?,
                to_sql_int("num_rows", record.num_rows)?,
                record.timestamp.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    fn append_failed_events(&self, records: &[FailedEventRecord]) -> ConnectorResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (dag_name, timestamp_us, error_code, location, position, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.events_table
            ))?;
            for record in records {
                stmt.execute(params![
                    record.dag_name,
                    record.timestamp.timestamp_micros(),
                    record.error_code.id(),
                    record.location,
                    to_sql_int("position", record.position)?,
                    record.payload,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn blob_records(&self, dag_name: &str) -> ConnectorResult<Vec<BlobProgressRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT dag_name, location, position, num_rows, timestamp_us
             FROM {} WHERE dag_name = ?1 ORDER BY rowid",
            self.blobs_table
        ))?;
        let records = stmt
            .query_map(params![dag_name], |row| {
                Ok(BlobProgressRecord {
                    dag_name: row.get(0)?,
                    location: row.get(1)?,
                    position: from_sql_int(2, row.get(2)?)?,
                    num_rows: from_sql_int(3, row.get(3)?)?,
                    timestamp: from_micros(4, row.get(4)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn failed_event_records(&self, dag_name: &str) -> ConnectorResult<Vec<FailedEventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT dag_name, timestamp_us, error_code, location, position, payload
             FROM {} WHERE dag_name = ?1 ORDER BY rowid",
            self.events_table
        ))?;
        let records = stmt
            .query_map(params![dag_name], |row| {
                Ok(FailedEventRecord {
                    dag_name: row.get(0)?,
                    timestamp: from_micros(1, row.get(1)?)?,
                    error_code: ErrorCode::from_id(row.get(2)?),
                    location: row.get(3)?,
                    position: from_sql_int(4, row.get(4)?)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> ConnectorResult<CleanupSummary> {
        let mut conn = self.lock()?;
        let cutoff_us = cutoff.timestamp_micros();

        let tx = conn.transaction()?;
        let blobs_deleted = tx.execute(
            &format!("DELETE FROM {} WHERE timestamp_us < ?1", self.blobs_table),
            params![cutoff_us],
        )?;
        let events_deleted = tx.execute(
            &format!("DELETE FROM {} WHERE timestamp_us < ?1", self.events_table),
            params![cutoff_us],
        )?;
        tx.commit()?;

        Ok(CleanupSummary {
            blobs_deleted,
            events_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SqliteLedgerStore {
        SqliteLedgerStore::open(":memory:", "tcrm", "monitoring").unwrap()
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let err = SqliteLedgerStore::open(":memory:", "tcrm; DROP TABLE x", "monitoring")
            .err()
            .unwrap();
        assert!(matches!(err, ConnectorError::MonitoringValue(_)));
    }

    #[test]
    fn test_blob_records_roundtrip() {
        let store = store();
        let timestamp = DateTime::<Utc>::from_timestamp_micros(1_700_000_000_123_456).unwrap();

        store
            .append_blob_record(&BlobProgressRecord {
                dag_name: "dag".to_string(),
                location: "events/part-0001.jsonl".to_string(),
                position: 500,
                num_rows: 250,
                timestamp,
            })
            .unwrap();

        let records = store.blob_records("dag").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location, "events/part-0001.jsonl");
        assert_eq!(records[0].position, 500);
        assert_eq!(records[0].num_rows, 250);
        assert_eq!(records[0].timestamp, timestamp);
        assert!(store.blob_records("other").unwrap().is_empty());
    }

    #[test]
    fn test_failed_events_keep_error_code() {
        let store = store();
        let now = Utc::now();
        let records: Vec<FailedEventRecord> = [ErrorCode::RateLimited, ErrorCode::InvalidEvent]
            .into_iter()
            .enumerate()
            .map(|(i, code)| FailedEventRecord {
                dag_name: "dag".to_string(),
                timestamp: now,
                error_code: code,
                location: "loc".to_string(),
                position: i as u64,
                payload: format!("{{\"n\":{i}}}"),
            })
            .collect();

        store.append_failed_events(&records).unwrap();

        let stored = store.failed_event_records("dag").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].error_code, ErrorCode::RateLimited);
        assert_eq!(stored[1].error_code, ErrorCode::InvalidEvent);
        assert_eq!(stored[1].payload, "{\"n\":1}");
    }

    #[test]
    fn test_delete_older_than() {
        let store = store();
        let now = Utc::now();

        for (position, age) in [(0u64, 30i64), (1, 1)] {
            store
                .append_blob_record(&BlobProgressRecord {
                    dag_name: "dag".to_string(),
                    location: "loc".to_string(),
                    position,
                    num_rows: 1,
                    timestamp: now - Duration::days(age),
                })
                .unwrap();
        }

        let summary = store.delete_older_than(now - Duration::days(7)).unwrap();
        assert_eq!(summary.blobs_deleted, 1);
        assert_eq!(summary.events_deleted, 0);

        let remaining = store.blob_records("dag").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].position, 1);
    }

    #[test]
    fn test_positions_beyond_sql_integer_are_rejected() {
        let store = store();
        let err = store
            .append_blob_record(&BlobProgressRecord {
                dag_name: "dag".to_string(),
                location: "loc".to_string(),
                position: u64::MAX,
                num_rows: 1,
                timestamp: Utc::now(),
            })
            .unwrap_err();

        assert!(err.is_ledger());
        assert!(store.blob_records("dag").unwrap().is_empty());
    }

    #[test]
    fn test_negative_stored_position_is_an_error() {
        let store = store();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO tcrm_monitoring_events
                 (dag_name, timestamp_us, error_code, location, position, payload)
                 VALUES ('dag', 0, 50, 'loc', -1, '{}')",
                [],
            )
            .unwrap();

        let err = store.failed_event_records("dag").unwrap_err();
        assert!(err.is_ledger());
    }
}
