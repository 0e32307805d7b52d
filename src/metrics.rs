//! Metrics and observability for the data connector.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metrics collector for one data connector
#[derive(Debug, Clone)]
pub struct ConnectorMetrics {
    /// DAG name for labeling
    dag_name: String,
}

impl ConnectorMetrics {
    /// Create a new metrics collector
    pub fn new(dag_name: impl Into<String>) -> Self {
        Self::register_metrics();

        Self {
            dag_name: dag_name.into(),
        }
    }

    fn register_metrics() {
        describe_counter!(
            "tcrm_connector_blobs_received_total",
            "Total number of blobs pulled from the input adapter or the ledger"
        );
        describe_counter!(
            "tcrm_connector_blobs_skipped_total",
            "Total number of empty blobs that were not sent"
        );
        describe_counter!(
            "tcrm_connector_events_sent_total",
            "Total number of events delivered by the output adapter"
        );
        describe_counter!(
            "tcrm_connector_events_failed_total",
            "Total number of events the output adapter could not deliver"
        );
        describe_counter!(
            "tcrm_connector_ledger_errors_total",
            "Total number of ledger writes that failed and were discarded"
        );

        describe_histogram!(
            "tcrm_connector_send_duration_seconds",
            "Time spent in send_events for each blob"
        );
        describe_histogram!(
            "tcrm_connector_blob_size",
            "Number of events in each blob"
        );

        describe_gauge!(
            "tcrm_connector_health",
            "Connector health status (1 = running, 0 = stopped)"
        );
    }

    /// Record a blob pulled from the source
    pub fn record_blob_received(&self, size: usize) {
        counter!(
            "tcrm_connector_blobs_received_total",
            "dag" => self.dag_name.clone(),
        )
        .increment(1);
        histogram!(
            "tcrm_connector_blob_size",
            "dag" => self.dag_name.clone(),
        )
        .record(size as f64);
    }

    /// Record an empty blob that was not sent
    pub fn record_blob_skipped(&self) {
        counter!(
            "tcrm_connector_blobs_skipped_total",
            "dag" => self.dag_name.clone(),
        )
        .increment(1);
    }

    /// Record the delivery outcome of one blob
    pub fn record_send(&self, delivered: usize, failed: usize, duration: Duration) {
        counter!(
            "tcrm_connector_events_sent_total",
            "dag" => self.dag_name.clone(),
        )
        .increment(delivered as u64);
        counter!(
            "tcrm_connector_events_failed_total",
            "dag" => self.dag_name.clone(),
        )
        .increment(failed as u64);
        histogram!(
            "tcrm_connector_send_duration_seconds",
            "dag" => self.dag_name.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Record a ledger write that failed
    pub fn record_ledger_error(&self, operation: &str) {
        counter!(
            "tcrm_connector_ledger_errors_total",
            "dag" => self.dag_name.clone(),
            "operation" => operation.to_string(),
        )
        .increment(1);
    }

    /// Set connector health status
    pub fn set_health(&self, healthy: bool) {
        gauge!(
            "tcrm_connector_health",
            "dag" => self.dag_name.clone(),
        )
        .set(if healthy { 1.0 } else { 0.0 });
    }
}
