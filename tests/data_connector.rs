//! Integration tests for the data connector pass
//!
//! Adapters are in-memory fakes; the ledger is a memory store unless noted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use tcrm_connect_core::{
    Blob, BlobProgressRecord, CleanupSummary, ConnectorError, ConnectorResult, DataConnector,
    DataConnectorConfig, ErrorCode, FailedEventRecord, HookRegistry, InputAdapter, InputHookType,
    LedgerStore, MemoryLedgerStore, MonitoringLedger, MonitoringSettings, OutputAdapter,
    OutputHookType, ProcessedRanges,
};

/// Source yielding a fixed list of blobs, minus the processed ranges
struct VecSource {
    blobs: Vec<Blob>,
    pending: Vec<Blob>,
}

impl VecSource {
    fn new(blobs: Vec<Blob>) -> Self {
        Self {
            blobs,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl InputAdapter for VecSource {
    fn get_location(&self) -> String {
        "vec".to_string()
    }

    async fn events_blobs_generator(&mut self, processed: ProcessedRanges) -> ConnectorResult<()> {
        self.pending = self
            .blobs
            .iter()
            .filter(|b| !processed.contains(&b.location, b.position))
            .cloned()
            .rev()
            .collect();
        Ok(())
    }

    async fn next_blob(&mut self) -> ConnectorResult<Option<Blob>> {
        Ok(self.pending.pop())
    }
}

/// Sink that records every blob it receives and fails events equal to a marker
#[derive(Clone, Default)]
struct CaptureSink {
    received: Arc<Mutex<Vec<Blob>>>,
    reject: Option<Value>,
    fatal: bool,
}

impl CaptureSink {
    fn rejecting(event: Value) -> Self {
        Self {
            reject: Some(event),
            ..Self::default()
        }
    }

    fn received(&self) -> Vec<Blob> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputAdapter for CaptureSink {
    async fn send_events(&mut self, mut blob: Blob) -> ConnectorResult<Blob> {
        if self.fatal {
            return Err(ConnectorError::fatal("destination rejected credentials"));
        }
        self.received.lock().unwrap().push(blob.clone());

        let rejected: Vec<(usize, Value)> = blob
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| Some(*e) == self.reject.as_ref())
            .map(|(i, e)| (i, e.clone()))
            .collect();
        for (index, event) in rejected {
            blob.append_failed_event(index, event, ErrorCode::ServerError);
        }
        let sent = blob.len() - blob.failed_events.len();
        blob.extend_reports(vec![json!({ "sent": sent })]);
        Ok(blob)
    }
}

/// Ledger backend whose writes always fail
struct BrokenStore;

impl LedgerStore for BrokenStore {
    fn append_blob_record(&self, _: &BlobProgressRecord) -> ConnectorResult<()> {
        Err(ConnectorError::ledger("disk full"))
    }
    fn append_failed_events(&self, _: &[FailedEventRecord]) -> ConnectorResult<()> {
        Err(ConnectorError::ledger("disk full"))
    }
    fn blob_records(&self, _: &str) -> ConnectorResult<Vec<BlobProgressRecord>> {
        Ok(Vec::new())
    }
    fn failed_event_records(&self, _: &str) -> ConnectorResult<Vec<FailedEventRecord>> {
        Ok(Vec::new())
    }
    fn delete_older_than(&self, _: DateTime<Utc>) -> ConnectorResult<CleanupSummary> {
        Ok(CleanupSummary::default())
    }
}

/// Memory store that remembers which thread served each read or write
#[derive(Default)]
struct ThreadTrackingStore {
    inner: MemoryLedgerStore,
    writers: Mutex<Vec<ThreadId>>,
}

impl ThreadTrackingStore {
    fn track(&self) {
        self.writers.lock().unwrap().push(std::thread::current().id());
    }
}

impl LedgerStore for ThreadTrackingStore {
    fn append_blob_record(&self, record: &BlobProgressRecord) -> ConnectorResult<()> {
        self.track();
        self.inner.append_blob_record(record)
    }
    fn append_failed_events(&self, records: &[FailedEventRecord]) -> ConnectorResult<()> {
        self.track();
        self.inner.append_failed_events(records)
    }
    fn blob_records(&self, dag_name: &str) -> ConnectorResult<Vec<BlobProgressRecord>> {
        self.track();
        self.inner.blob_records(dag_name)
    }
    fn failed_event_records(&self, dag_name: &str) -> ConnectorResult<Vec<FailedEventRecord>> {
        self.track();
        self.inner.failed_event_records(dag_name)
    }
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> ConnectorResult<CleanupSummary> {
        self.inner.delete_older_than(cutoff)
    }
}

fn config() -> DataConnectorConfig {
    let mut config = DataConnectorConfig::new(
        "test_dag",
        InputHookType::Custom("vec".to_string()),
        OutputHookType::Custom("capture".to_string()),
    );
    config.monitoring = MonitoringSettings::new("tcrm", "monitoring", "memory");
    config.return_report = true;
    config
}

fn two_blobs() -> Vec<Blob> {
    vec![
        Blob::new(vec![json!("e0"), json!("e1")], "table", 0),
        Blob::new(vec![json!("e2")], "table", 2),
    ]
}

fn connector(
    config: DataConnectorConfig,
    source: VecSource,
    sink: &CaptureSink,
    store: Arc<dyn LedgerStore>,
) -> DataConnector {
    let ledger = MonitoringLedger::new(store, config.dag_name.clone());
    DataConnector::with_adapters(config, Box::new(source), Box::new(sink.clone()), Some(ledger))
        .unwrap()
}

#[tokio::test]
async fn test_partial_failure_is_recorded() {
    let store = Arc::new(MemoryLedgerStore::new());
    let sink = CaptureSink::rejecting(json!("e1"));
    let mut connector = connector(config(), VecSource::new(two_blobs()), &sink, store.clone());

    let report = connector.execute().await.unwrap().unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report[0].failed_events, 1);
    assert_eq!(report[0].reports, vec![json!({"sent": 1})]);
    assert_eq!(report[1].delivered(), 1);

    let progress = store.blob_records("test_dag").unwrap();
    assert_eq!(progress.len(), 2);
    assert_eq!((progress[1].location.as_str(), progress[1].position), ("table", 2));

    let failed = store.failed_event_records("test_dag").unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload, "\"e1\"");
    assert_eq!(failed[0].position, 1);
    assert_eq!(failed[0].error_code, ErrorCode::ServerError);
}

#[tokio::test]
async fn test_monitoring_disabled_writes_nothing() {
    let store = Arc::new(MemoryLedgerStore::new());
    let sink = CaptureSink::rejecting(json!("e1"));
    let mut config = config();
    config.enable_monitoring = false;
    let mut connector = connector(config, VecSource::new(two_blobs()), &sink, store.clone());

    let report = connector.execute().await.unwrap().unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(sink.received().len(), 2);
    assert!(store.blob_records("test_dag").unwrap().is_empty());
    assert!(store.failed_event_records("test_dag").unwrap().is_empty());
    assert_eq!(connector.cleanup().unwrap(), None);
}

#[tokio::test]
async fn test_retry_sends_one_blob_per_location() {
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = MonitoringLedger::new(store.clone(), "test_dag");

    let mut first = Blob::new(vec![json!("a"), json!("b"), json!("c")], "table", 0);
    first.fail_all(ErrorCode::RateLimited);
    ledger.store_events(&first).unwrap();

    let sink = CaptureSink::default();
    let mut config = config();
    config.is_retry = true;
    let source = VecSource::new(vec![Blob::new(vec![json!("unused")], "other", 0)]);
    let mut connector = connector(config, source, &sink, store.clone());

    let report = connector.execute().await.unwrap().unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].location, "table");
    assert_eq!(received[0].events, vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].failed_events, 0);
}

#[tokio::test]
async fn test_retry_walks_locations_in_order() {
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = MonitoringLedger::new(store.clone(), "test_dag");

    for (location, position) in [("table_b", 7), ("table_a", 3), ("table_b", 1)] {
        let mut blob = Blob::new(vec![json!(format!("{location}-{position}"))], location, position);
        blob.fail_all(ErrorCode::Timeout);
        ledger.store_events(&blob).unwrap();
    }

    let sink = CaptureSink::default();
    let mut config = config();
    config.is_retry = true;
    let mut connector = connector(config, VecSource::new(Vec::new()), &sink, store);

    connector.execute().await.unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].location, "table_a");
    assert_eq!(received[1].location, "table_b");
    assert_eq!(received[1].position, 1);
    assert_eq!(received[1].events, vec![json!("table_b-1"), json!("table_b-7")]);
}

#[tokio::test]
async fn test_ledger_io_runs_on_blocking_threads() {
    let store = Arc::new(ThreadTrackingStore::default());
    let sink = CaptureSink::rejecting(json!("e1"));
    let mut connector = connector(config(), VecSource::new(two_blobs()), &sink, store.clone());

    connector.execute().await.unwrap();

    // The current-thread test runtime polls the pass on this thread
    let runtime_thread = std::thread::current().id();
    let writers = store.writers.lock().unwrap().clone();
    assert!(!writers.is_empty());
    assert!(writers.iter().all(|id| *id != runtime_thread));
    assert_eq!(store.inner.blob_records("test_dag").unwrap().len(), 2);
    assert_eq!(store.inner.failed_event_records("test_dag").unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_run_skips_processed_ranges() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());

    let first_sink = CaptureSink::default();
    let mut first = connector(config(), VecSource::new(two_blobs()), &first_sink, store.clone());
    first.execute().await.unwrap();
    assert_eq!(first_sink.received().len(), 2);

    let second_sink = CaptureSink::default();
    let mut second = connector(config(), VecSource::new(two_blobs()), &second_sink, store);
    let report = second.execute().await.unwrap().unwrap();

    assert!(second_sink.received().is_empty());
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_empty_blob_is_recorded_but_not_sent() {
    let store = Arc::new(MemoryLedgerStore::new());
    let sink = CaptureSink::default();
    let source = VecSource::new(vec![Blob::new(Vec::new(), "table", 0).with_num_rows(4)]);
    let mut connector = connector(config(), source, &sink, store.clone());

    let report = connector.execute().await.unwrap().unwrap();

    assert!(sink.received().is_empty());
    assert!(report.is_empty());
    let progress = store.blob_records("test_dag").unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].num_rows, 4);
    assert!(store.failed_event_records("test_dag").unwrap().is_empty());
}

#[tokio::test]
async fn test_report_not_returned_unless_requested() {
    let sink = CaptureSink::default();
    let mut config = config();
    config.return_report = false;
    let mut connector = connector(
        config,
        VecSource::new(two_blobs()),
        &sink,
        Arc::new(MemoryLedgerStore::new()),
    );

    assert_eq!(connector.execute().await.unwrap(), None);
    assert_eq!(sink.received().len(), 2);
}

#[tokio::test]
async fn test_adapter_wide_error_aborts_the_pass() {
    let store = Arc::new(MemoryLedgerStore::new());
    let sink = CaptureSink {
        fatal: true,
        ..CaptureSink::default()
    };
    let mut connector = connector(config(), VecSource::new(two_blobs()), &sink, store.clone());

    let err = connector.execute().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(store.blob_records("test_dag").unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_write_errors_do_not_abort() {
    let sink = CaptureSink::rejecting(json!("e0"));
    let mut connector = connector(
        config(),
        VecSource::new(two_blobs()),
        &sink,
        Arc::new(BrokenStore),
    );

    let report = connector.execute().await.unwrap().unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(sink.received().len(), 2);
}

#[test]
fn test_monitoring_without_ledger_is_rejected() {
    let err = DataConnector::with_adapters(
        config(),
        Box::new(VecSource::new(Vec::new())),
        Box::new(CaptureSink::default()),
        None,
    )
    .err()
    .unwrap();
    assert!(matches!(err, ConnectorError::MonitoringValue(_)));

    let mut config = config();
    config.monitoring.connection_id = None;
    let err = DataConnector::new(config, &HookRegistry::default())
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::MonitoringValue(_)));
}

#[tokio::test]
async fn test_cleanup_keeps_fresh_records() {
    let store = Arc::new(MemoryLedgerStore::new());
    let sink = CaptureSink::rejecting(json!("e2"));
    let mut connector = connector(config(), VecSource::new(two_blobs()), &sink, store.clone());
    connector.execute().await.unwrap();

    let summary = connector.cleanup().unwrap().unwrap();

    assert_eq!(summary, CleanupSummary::default());
    assert_eq!(store.blob_records("test_dag").unwrap().len(), 2);
    assert_eq!(store.failed_event_records("test_dag").unwrap().len(), 1);
}

#[tokio::test]
async fn test_jsonl_source_with_sqlite_ledger() {
    let dir = std::env::temp_dir().join(format!("tcrm-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("events.jsonl"),
        "{\"id\":0}\n{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n{\"id\":4}\n",
    )
    .unwrap();
    let db = dir.join("ledger.db");

    let sink = CaptureSink::rejecting(json!({"id": 3}));
    let mut registry = HookRegistry::default();
    let registered = sink.clone();
    registry.register_output(OutputHookType::Custom("capture".to_string()), move |_| {
        Ok(Box::new(registered.clone()))
    });

    let mut config = config();
    config.input_hook = InputHookType::JsonLines;
    config.monitoring =
        MonitoringSettings::new("tcrm", "monitoring", format!("sqlite://{}", db.display()));
    config
        .input_params
        .insert("path".to_string(), dir.display().to_string().into());
    config.input_params.insert("blob_size".to_string(), 2.into());

    let mut connector = DataConnector::new(config.clone(), &registry).unwrap();
    let report = connector.execute().await.unwrap().unwrap();
    assert_eq!(report.len(), 3);
    assert_eq!(sink.received().len(), 3);

    // Fresh connector over the same database: every range is already processed
    let mut rerun = DataConnector::new(config.clone(), &registry).unwrap();
    let report = rerun.execute().await.unwrap().unwrap();
    assert!(report.is_empty());
    assert_eq!(sink.received().len(), 3);

    config.is_retry = true;
    let mut retry = DataConnector::new(config, &registry).unwrap();
    let report = retry.execute().await.unwrap().unwrap();
    assert_eq!(report.len(), 1);
    let last = sink.received().pop().unwrap();
    assert_eq!(last.events, vec![json!({"id": 3})]);
    assert_eq!(last.position, 3);

    std::fs::remove_dir_all(&dir).ok();
}
