//! DataConnector - input adapter → output adapter, recorded in the ledger
//!
//! One `execute` call is one pass: blobs are pulled, sent and recorded strictly
//! one after the other until the source is exhausted.

use crate::{
    Blob, BlobOutcome, CleanupSummary, ConnectorError, ConnectorMetrics, ConnectorResult,
    DataConnectorConfig, HookContext, HookRegistry, InputAdapter, MonitoringLedger,
    OutputAdapter,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Blobs rebuilt from the ledger's failed events, produced one at a time
type RetryBlobs = Box<dyn Iterator<Item = Blob> + Send>;

/// Runtime tying one input adapter, one output adapter and the monitoring
/// ledger together for a DAG
///
/// Create with [`DataConnector::new`] (adapters selected by hook tag) or
/// [`DataConnector::with_adapters`], then run with `.execute().await`.
pub struct DataConnector {
    config: DataConnectorConfig,
    input: Box<dyn InputAdapter>,
    output: Box<dyn OutputAdapter>,
    ledger: Option<MonitoringLedger>,
    metrics: ConnectorMetrics,
}

impl DataConnector {
    /// Build the adapters named by `config` from `registry` and open the ledger
    ///
    /// # Errors
    ///
    /// `Configuration` for an invalid config or unknown hook tag,
    /// `MonitoringValue` when monitoring is enabled without dataset, table or
    /// connection id, and whatever the hook constructors or ledger backend raise.
    pub fn new(config: DataConnectorConfig, registry: &HookRegistry) -> ConnectorResult<Self> {
        config.validate()?;
        Self::init_tracing(&config);

        info!("Initializing Data Connector");
        info!("DAG: {}", config.dag_name);
        info!(
            "Hooks: {} -> {}",
            config.input_hook, config.output_hook
        );

        let input = registry.build_input(
            &config.input_hook,
            &HookContext {
                dag_name: &config.dag_name,
                params: &config.input_params,
                retry: &config.retry,
            },
        )?;
        let output = registry.build_output(
            &config.output_hook,
            &HookContext {
                dag_name: &config.dag_name,
                params: &config.output_params,
                retry: &config.retry,
            },
        )?;

        let ledger = if config.enable_monitoring {
            Some(MonitoringLedger::open(&config.monitoring, &config.dag_name)?)
        } else {
            None
        };

        Ok(Self::assemble(config, input, output, ledger))
    }

    /// Use adapters and ledger built by the caller
    ///
    /// `ledger` is required when `config.enable_monitoring` is set and ignored
    /// otherwise.
    pub fn with_adapters(
        config: DataConnectorConfig,
        input: Box<dyn InputAdapter>,
        output: Box<dyn OutputAdapter>,
        ledger: Option<MonitoringLedger>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        Self::init_tracing(&config);

        let ledger = match (config.enable_monitoring, ledger) {
            (true, None) => {
                return Err(ConnectorError::monitoring_value(
                    "monitoring is enabled but no ledger was provided",
                ))
            }
            (true, ledger) => ledger,
            (false, Some(_)) => {
                debug!("Monitoring disabled, ignoring the provided ledger");
                None
            }
            (false, None) => None,
        };

        Ok(Self::assemble(config, input, output, ledger))
    }

    fn assemble(
        config: DataConnectorConfig,
        input: Box<dyn InputAdapter>,
        output: Box<dyn OutputAdapter>,
        ledger: Option<MonitoringLedger>,
    ) -> Self {
        let metrics = ConnectorMetrics::new(&config.dag_name);
        Self {
            config,
            input,
            output,
            ledger,
            metrics,
        }
    }

    pub fn config(&self) -> &DataConnectorConfig {
        &self.config
    }

    pub fn ledger(&self) -> Option<&MonitoringLedger> {
        self.ledger.as_ref()
    }

    /// Run one pass over the source
    ///
    /// Returns one [`BlobOutcome`] per sent blob when `return_report` is set,
    /// `None` otherwise.
    ///
    /// # Errors
    ///
    /// Adapter-wide failures (from `events_blobs_generator`, `next_blob` or
    /// `send_events`) and ledger read failures abort the pass. Ledger write
    /// failures are logged and the pass continues.
    pub async fn execute(&mut self) -> ConnectorResult<Option<Vec<BlobOutcome>>> {
        info!(
            "Starting {} pass for dag {}",
            if self.config.is_retry { "retry" } else { "normal" },
            self.config.dag_name
        );
        self.metrics.set_health(true);

        let result = self.run_pass().await;

        self.metrics.set_health(false);
        match result {
            Ok(report) => {
                info!(
                    "Pass finished for dag {}: {} blob(s) sent",
                    self.config.dag_name,
                    report.len()
                );
                Ok(self.config.return_report.then_some(report))
            }
            Err(e) => {
                error!("Pass aborted for dag {}: {}", self.config.dag_name, e);
                Err(e)
            }
        }
    }

    async fn run_pass(&mut self) -> ConnectorResult<Vec<BlobOutcome>> {
        let mut retry_blobs = self.prepare_source().await?;
        let mut report = Vec::new();

        loop {
            let next = match retry_blobs.as_mut() {
                Some(blobs) => blobs.next(),
                None => self.input.next_blob().await?,
            };
            let Some(blob) = next else {
                break;
            };
            self.process_blob(blob, &mut report).await?;
        }

        Ok(report)
    }

    /// Retry mode: the ledger's failed events, rebuilt into blobs.
    /// Normal mode: hand the processed ranges to the input adapter.
    async fn prepare_source(&mut self) -> ConnectorResult<Option<RetryBlobs>> {
        if self.config.is_retry {
            let ledger = self.ledger.clone().ok_or_else(|| {
                ConnectorError::config("is_retry requires enable_monitoring")
            })?;
            let blobs = run_blocking(ledger, |ledger| {
                let blobs = ledger.events_blobs_generator()?;
                Ok(Box::new(blobs) as RetryBlobs)
            })
            .await?;
            info!(
                "Retrying failed events of dag {} from the ledger",
                self.config.dag_name
            );
            return Ok(Some(blobs));
        }

        let processed = match self.ledger.clone() {
            Some(ledger) => {
                run_blocking(ledger, |ledger| ledger.generate_processed_blobs_ranges()).await?
            }
            None => Default::default(),
        };
        info!(
            "Reading from {} ({} range(s) already processed)",
            self.input.get_location(),
            processed.len()
        );
        self.input.events_blobs_generator(processed).await?;
        Ok(None)
    }

    async fn process_blob(
        &mut self,
        blob: Blob,
        report: &mut Vec<BlobOutcome>,
    ) -> ConnectorResult<()> {
        self.metrics.record_blob_received(blob.len());

        let blob = if blob.is_empty() {
            debug!(
                "Blob {}:{} has no events, not sending",
                blob.location, blob.position
            );
            self.metrics.record_blob_skipped();
            blob
        } else {
            let sent = blob.len();
            let started = Instant::now();
            let mut blob = self.output.send_events(blob).await?;
            Self::drop_out_of_range_failures(&mut blob, sent);

            let failed = blob.failed_events.len();
            self.metrics
                .record_send(sent.saturating_sub(failed), failed, started.elapsed());
            if failed > 0 {
                warn!(
                    "{}/{} event(s) of {}:{} failed",
                    failed, sent, blob.location, blob.position
                );
            }
            if self.config.return_report {
                report.push(BlobOutcome::from(&blob));
            }
            blob
        };

        if let Some(ledger) = self.ledger.clone() {
            let metrics = self.metrics.clone();
            let recorded =
                tokio::task::spawn_blocking(move || Self::record_blob(&ledger, &metrics, &blob))
                    .await;
            if let Err(e) = recorded {
                error!(
                    "Ledger write for dag {} did not complete: {}",
                    self.config.dag_name, e
                );
                self.metrics.record_ledger_error("record_blob");
            }
        }

        Ok(())
    }

    /// `store_blob` then `store_events`; failures are logged and discarded
    fn record_blob(ledger: &MonitoringLedger, metrics: &ConnectorMetrics, blob: &Blob) {
        if let Err(e) = ledger.store_blob(&blob.location, blob.position, blob.num_rows) {
            error!(
                "Failed to record progress for {}:{}: {}",
                blob.location, blob.position, e
            );
            metrics.record_ledger_error("store_blob");
        }
        if let Err(e) = ledger.store_events(blob) {
            error!(
                "Failed to record {} failed event(s) for {}:{}: {}",
                blob.failed_events.len(),
                blob.location,
                blob.position,
                e
            );
            metrics.record_ledger_error("store_events");
        }
    }

    /// Failures must point into the events that were sent
    fn drop_out_of_range_failures(blob: &mut Blob, sent: usize) {
        let before = blob.failed_events.len();
        blob.failed_events.retain(|failed| failed.index < sent);
        let dropped = before - blob.failed_events.len();
        if dropped > 0 {
            warn!(
                "Output adapter reported {} failure(s) outside the {} sent event(s) of {}:{}",
                dropped, sent, blob.location, blob.position
            );
        }
    }

    /// Delete ledger records older than `monitoring.days_to_live` days
    ///
    /// Returns `None` when monitoring is disabled.
    pub fn cleanup(&self) -> ConnectorResult<Option<CleanupSummary>> {
        match &self.ledger {
            Some(ledger) => ledger
                .cleanup_by_days_to_live(self.config.monitoring.days_to_live)
                .map(Some),
            None => Ok(None),
        }
    }

    fn init_tracing(config: &DataConnectorConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}

/// Ledger backends do synchronous I/O; run it on the blocking pool
async fn run_blocking<T, F>(ledger: MonitoringLedger, operation: F) -> ConnectorResult<T>
where
    T: Send + 'static,
    F: FnOnce(&MonitoringLedger) -> ConnectorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || operation(&ledger))
        .await
        .map_err(|e| ConnectorError::ledger_with_source("Ledger task did not complete", e))?
}
