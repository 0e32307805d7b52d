//! # TCRM Connect Core
//!
//! Core data-transfer SDK for TCRM pipelines.
//!
//! This library moves batches of events (blobs) from an input adapter to an output
//! adapter, and records in a monitoring ledger which source ranges were dispatched
//! and which individual events failed. A later run skips the recorded ranges; a
//! retry run resends the recorded failures.
//!
//! ## Overview
//!
//! A pipeline plugs in two adapters:
//! - **Input adapter**: reads an external source in blobs (warehouse table, files)
//! - **Output adapter**: delivers each blob's events to a destination and reports
//!   per-event failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcrm_connect_core::{
//!     DataConnector, DataConnectorConfig, HookRegistry, InputHookType, MonitoringSettings,
//!     OutputHookType,
//! };
//!
//! # async fn run() -> tcrm_connect_core::ConnectorResult<()> {
//! let mut config = DataConnectorConfig::new("ga_upload", InputHookType::JsonLines, OutputHookType::Http);
//! config.monitoring = MonitoringSettings::new("tcrm", "monitoring", "sqlite:///var/lib/tcrm/ledger.db");
//! config.input_params.insert("path".into(), "/data/events".into());
//! config.output_params.insert("endpoint".into(), "https://collect.example.com/events".into());
//!
//! let mut connector = DataConnector::new(config, &HookRegistry::default())?;
//! connector.execute().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Resumable runs**: progress records let a rerun skip every dispatched range
//! - **Retry mode**: failed events are rebuilt into blobs and resent
//! - **Best-effort monitoring**: ledger write failures are logged, never fatal
//! - **Observability**: metrics and structured logging
//! - **Configuration**: environment variables and TOML files

pub mod adapters;
mod config;
mod error;
mod error_code;
mod hooks;
mod ledger;
mod message;
mod metrics;
mod retry;
mod runtime;
mod traits;

// Re-export public API
pub use config::{DataConnectorConfig, MonitoringSettings, RetrySettings};
pub use error::{ConnectorError, ConnectorResult};
pub use error_code::ErrorCode;
pub use hooks::{
    optional_u64, required_str, HookContext, HookParams, HookRegistry, InputConstructor,
    InputHookType, OutputConstructor, OutputHookType,
};
pub use ledger::{
    open_ledger_store, BlobProgressRecord, CleanupSummary, FailedEventRecord, LedgerStore,
    MemoryLedgerStore, MonitoringLedger, SqliteLedgerStore,
};
pub use message::{Blob, BlobOutcome, FailedEvent};
pub use metrics::ConnectorMetrics;
pub use runtime::DataConnector;
pub use traits::{InputAdapter, OutputAdapter, ProcessedRanges};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
