//! Retry example with custom adapters
//!
//! Registers a flaky output adapter under a custom hook tag, runs a normal pass
//! that leaves failed events in a shared in-memory ledger, then a retry pass
//! that resends exactly those events.
//!
//! Usage:
//!   cargo run --example retry_failed_events

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tcrm_connect_core::{
    Blob, ConnectorResult, DataConnector, DataConnectorConfig, ErrorCode, HookRegistry,
    InputAdapter, InputHookType, MonitoringSettings, OutputAdapter, OutputHookType,
    ProcessedRanges,
};

/// Source producing two blobs of numbered events
struct CounterSource {
    pending: Vec<Blob>,
}

#[async_trait]
impl InputAdapter for CounterSource {
    fn get_location(&self) -> String {
        "counter".to_string()
    }

    async fn events_blobs_generator(&mut self, processed: ProcessedRanges) -> ConnectorResult<()> {
        self.pending = [0u64, 3]
            .into_iter()
            .filter(|position| !processed.contains("counter", *position))
            .map(|position| {
                let events = (position..position + 3).map(|n| json!({ "n": n })).collect();
                Blob::new(events, "counter", position)
            })
            .rev()
            .collect();
        Ok(())
    }

    async fn next_blob(&mut self) -> ConnectorResult<Option<Blob>> {
        Ok(self.pending.pop())
    }
}

/// Sink rejecting odd events until `healthy` is set
struct FlakySink {
    healthy: Arc<AtomicBool>,
}

#[async_trait]
impl OutputAdapter for FlakySink {
    async fn send_events(&mut self, mut blob: Blob) -> ConnectorResult<Blob> {
        let healthy = self.healthy.load(Ordering::Relaxed);
        let mut rejected = Vec::new();

        for (index, event) in blob.events.iter().enumerate() {
            let odd = event["n"].as_u64().is_some_and(|n| n % 2 == 1);
            if odd && !healthy {
                rejected.push((index, event.clone()));
            } else {
                println!("sent {}", event);
            }
        }
        for (index, event) in rejected {
            blob.append_failed_event(index, event, ErrorCode::RateLimited);
        }
        Ok(blob)
    }
}

fn registry(healthy: Arc<AtomicBool>) -> HookRegistry {
    let mut registry = HookRegistry::empty();
    registry.register_input(InputHookType::Custom("counter".to_string()), |_| {
        Ok(Box::new(CounterSource {
            pending: Vec::new(),
        }))
    });
    registry.register_output(OutputHookType::Custom("flaky".to_string()), move |_| {
        Ok(Box::new(FlakySink {
            healthy: healthy.clone(),
        }))
    });
    registry
}

#[tokio::main]
async fn main() -> ConnectorResult<()> {
    let healthy = Arc::new(AtomicBool::new(false));
    let registry = registry(healthy.clone());

    let mut config = DataConnectorConfig::new(
        "retry-demo",
        "counter".parse()?,
        "flaky".parse()?,
    );
    config.monitoring = MonitoringSettings::new("tcrm", "monitoring", "memory://retry-demo");
    config.return_report = true;

    println!("=== Normal pass ===");
    let report = DataConnector::new(config.clone(), &registry)?
        .execute()
        .await?
        .unwrap_or_default();
    let failed: usize = report.iter().map(|o| o.failed_events).sum();
    println!("{} blob(s) sent, {} event(s) failed", report.len(), failed);

    healthy.store(true, Ordering::Relaxed);

    println!("=== Retry pass ===");
    config.is_retry = true;
    let report = DataConnector::new(config, &registry)?
        .execute()
        .await?
        .unwrap_or_default();
    for outcome in report {
        println!(
            "{}: {} event(s) resent, {} failed",
            outcome.location,
            outcome.num_rows,
            outcome.failed_events
        );
    }

    Ok(())
}
