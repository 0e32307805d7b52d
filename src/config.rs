//! Configuration management for the data connector.

use crate::{ConnectorError, ConnectorResult, HookParams, InputHookType, OutputHookType};
use serde::{Deserialize, Serialize};
use std::env;

/// Main configuration for one data connector task
///
/// # Structure
/// - **Mandatory fields** (from environment or file): `dag_name`, `input_hook`, `output_hook`
/// - **Optional fields** (from config file or defaults): run flags, `monitoring`,
///   adapter parameters, `retry`, `log_level`
///
/// Adapter parameters are forwarded verbatim to the selected hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConnectorConfig {
    /// Name of the pipeline; every ledger record is keyed by it
    pub dag_name: String,

    /// Which input adapter to build
    pub input_hook: InputHookType,

    /// Which output adapter to build
    pub output_hook: OutputHookType,

    /// Return the per-blob report from `execute`
    #[serde(default)]
    pub return_report: bool,

    /// Record progress and failed events in the ledger
    #[serde(default = "default_enable_monitoring")]
    pub enable_monitoring: bool,

    /// Resend the ledger's failed events instead of reading the input source
    #[serde(default)]
    pub is_retry: bool,

    /// Ledger connection settings
    #[serde(default)]
    pub monitoring: MonitoringSettings,

    /// Parameters for the input adapter
    #[serde(default)]
    pub input_params: HookParams,

    /// Parameters for the output adapter
    #[serde(default)]
    pub output_params: HookParams,

    /// Retry settings used by adapters for transient failures
    #[serde(default)]
    pub retry: RetrySettings,

    /// Log level (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_enable_monitoring() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl DataConnectorConfig {
    /// Create a configuration with defaults for every optional field
    pub fn new(
        dag_name: impl Into<String>,
        input_hook: InputHookType,
        output_hook: OutputHookType,
    ) -> Self {
        Self {
            dag_name: dag_name.into(),
            input_hook,
            output_hook,
            return_report: false,
            enable_monitoring: default_enable_monitoring(),
            is_retry: false,
            monitoring: MonitoringSettings::default(),
            input_params: HookParams::new(),
            output_params: HookParams::new(),
            retry: RetrySettings::default(),
            log_level: default_log_level(),
        }
    }

    /// Load mandatory configuration from environment variables
    ///
    /// Reads:
    /// - `DAG_NAME`: pipeline name (required)
    /// - `INPUT_HOOK`: input hook tag (required)
    /// - `OUTPUT_HOOK`: output hook tag (required)
    /// - `MONITORING_DATASET`, `MONITORING_TABLE`, `MONITORING_CONNECTION_ID` (optional)
    ///
    /// Everything else uses defaults.
    pub fn from_env() -> ConnectorResult<Self> {
        let dag_name =
            env::var("DAG_NAME").map_err(|_| ConnectorError::config("DAG_NAME is required"))?;
        let input_hook = env::var("INPUT_HOOK")
            .map_err(|_| ConnectorError::config("INPUT_HOOK is required"))?
            .parse()?;
        let output_hook = env::var("OUTPUT_HOOK")
            .map_err(|_| ConnectorError::config("OUTPUT_HOOK is required"))?
            .parse()?;

        let mut config = Self::new(dag_name, input_hook, output_hook);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        Self::from_toml_str(&content)
            .map_err(|e| ConnectorError::config(format!("Failed to parse config file {}: {}", path, e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConnectorResult<Self> {
        toml::from_str(content).map_err(|e| ConnectorError::config(e.to_string()))
    }

    /// Apply environment variable overrides
    ///
    /// Only the DAG name and the monitoring connection identifiers can be
    /// overridden; run flags and adapter parameters belong in the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("DAG_NAME") {
            self.dag_name = val;
        }
        if let Ok(val) = env::var("MONITORING_DATASET") {
            self.monitoring.dataset = Some(val);
        }
        if let Ok(val) = env::var("MONITORING_TABLE") {
            self.monitoring.table = Some(val);
        }
        if let Ok(val) = env::var("MONITORING_CONNECTION_ID") {
            self.monitoring.connection_id = Some(val);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.dag_name.trim().is_empty() {
            return Err(ConnectorError::config("dag_name cannot be empty"));
        }

        if self.retry.max_retries > 100 {
            return Err(ConnectorError::config("max_retries too high (max 100)"));
        }

        if self.enable_monitoring {
            self.monitoring.validate()?;
        } else if self.is_retry {
            return Err(ConnectorError::config(
                "is_retry requires enable_monitoring: failed events are read from the ledger",
            ));
        }

        Ok(())
    }
}

/// Ledger connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Dataset (schema) holding the ledger tables
    #[serde(default)]
    pub dataset: Option<String>,

    /// Base name of the ledger tables
    #[serde(default)]
    pub table: Option<String>,

    /// Connection to the ledger backend, e.g. `sqlite:///var/lib/tcrm/ledger.db` or `memory`
    #[serde(default)]
    pub connection_id: Option<String>,

    /// Age in days after which the cleanup sweep deletes records
    #[serde(default = "default_days_to_live")]
    pub days_to_live: u32,
}

fn default_days_to_live() -> u32 {
    50
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            dataset: None,
            table: None,
            connection_id: None,
            days_to_live: default_days_to_live(),
        }
    }
}

impl MonitoringSettings {
    /// Create settings with every connection parameter set
    pub fn new(
        dataset: impl Into<String>,
        table: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset: Some(dataset.into()),
            table: Some(table.into()),
            connection_id: Some(connection_id.into()),
            days_to_live: default_days_to_live(),
        }
    }

    /// Fail with a monitoring value error when any connection parameter is missing
    pub fn validate(&self) -> ConnectorResult<()> {
        let missing: Vec<&str> = [
            ("dataset", &self.dataset),
            ("table", &self.table),
            ("connection_id", &self.connection_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConnectorError::monitoring_value(format!(
                "monitoring is enabled but {} not set",
                missing.join(", ")
            )));
        }

        if self.days_to_live == 0 {
            return Err(ConnectorError::config("days_to_live must be > 0"));
        }

        Ok(())
    }
}

/// Retry configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum number of retries for failed operations
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff duration in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_backoff_ms: 30000,
        }
    }
}
