//! JSON lines → HTTP example
//!
//! Reads newline-delimited JSON files and POSTs every event to an HTTP endpoint,
//! recording progress and failures in a SQLite ledger. Running it twice only
//! sends lines added since the first run.
//!
//! Usage:
//!   DAG_NAME=jsonl-demo \
//!   INPUT_HOOK=jsonl \
//!   OUTPUT_HOOK=http \
//!   MONITORING_DATASET=tcrm \
//!   MONITORING_TABLE=monitoring \
//!   MONITORING_CONNECTION_ID=sqlite://./ledger.db \
//!   INPUT_PATH=./data \
//!   ENDPOINT=http://localhost:8080/collect \
//!   cargo run --example jsonl_to_http

use serde_json::json;
use tcrm_connect_core::{ConnectorResult, DataConnector, DataConnectorConfig, HookRegistry};

#[tokio::main]
async fn main() -> ConnectorResult<()> {
    let mut config = DataConnectorConfig::from_env()?;
    config.return_report = true;

    let path = std::env::var("INPUT_PATH").unwrap_or_else(|_| "./data".to_string());
    let endpoint =
        std::env::var("ENDPOINT").unwrap_or_else(|_| "http://localhost:8080/collect".to_string());
    config.input_params.insert("path".to_string(), json!(path));
    config.input_params.insert("blob_size".to_string(), json!(500));
    config
        .output_params
        .insert("endpoint".to_string(), json!(endpoint));

    let mut connector = DataConnector::new(config, &HookRegistry::default())?;
    let report = connector.execute().await?.unwrap_or_default();

    for outcome in &report {
        println!(
            "{}:{} - {} delivered, {} failed",
            outcome.location,
            outcome.position,
            outcome.delivered(),
            outcome.failed_events
        );
    }

    if let Some(summary) = connector.cleanup()? {
        println!(
            "Cleanup: {} progress record(s), {} failed event(s) expired",
            summary.blobs_deleted, summary.events_deleted
        );
    }

    Ok(())
}
