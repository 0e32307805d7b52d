//! Error types for connector operations.

use thiserror::Error;

/// Result type for connector operations
///
/// **Mandatory public API** - every adapter, ledger and runtime method returns this.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Error types for connector operations
///
/// Per-event delivery failures are never represented here: they travel as data
/// inside [`Blob::failed_events`](crate::Blob). This enum covers failures that
/// concern a whole adapter, the ledger, or the configuration.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Retryable errors - transient failures that may succeed on a later attempt
    ///
    /// Examples: network timeouts, temporary service unavailability, rate limits
    #[error("Retryable error: {message}")]
    Retryable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Fatal errors - adapter-wide failures that abort the current run
    ///
    /// Examples: authentication failures, source or destination does not exist
    #[error("Fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error - detected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Monitoring is enabled but its connection parameters are incomplete
    #[error("Monitoring value error: {0}")]
    MonitoringValue(String),

    /// Ledger backend failure (read, write or cleanup)
    #[error("Ledger error: {message}")]
    Ledger {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Retryable { .. })
    }

    /// Check if this error is fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectorError::Fatal { .. })
    }

    /// Check if this error comes from the ledger backend
    pub fn is_ledger(&self) -> bool {
        matches!(self, ConnectorError::Ledger { .. })
    }

    /// Check if this error was raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConnectorError::Configuration(_) | ConnectorError::MonitoringValue(_)
        )
    }

    /// Create a retryable error from a message
    pub fn retryable(message: impl Into<String>) -> Self {
        ConnectorError::Retryable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a retryable error with source
    pub fn retryable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Retryable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a fatal error from a message
    pub fn fatal(message: impl Into<String>) -> Self {
        ConnectorError::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fatal error with source
    pub fn fatal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Fatal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ConnectorError::Configuration(message.into())
    }

    /// Create a monitoring value error
    pub fn monitoring_value(message: impl Into<String>) -> Self {
        ConnectorError::MonitoringValue(message.into())
    }

    /// Create a ledger error from a message
    pub fn ledger(message: impl Into<String>) -> Self {
        ConnectorError::Ledger {
            message: message.into(),
            source: None,
        }
    }

    /// Create a ledger error with source
    pub fn ledger_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Ledger {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for ConnectorError {
    fn from(err: rusqlite::Error) -> Self {
        ConnectorError::ledger_with_source("SQLite ledger operation failed", err)
    }
}
