//! Shared taxonomy of per-event delivery errors.
//!
//! Output adapters tag every undelivered event with one of these codes. The
//! numeric id is what the ledger persists in its `error_code` column.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason an individual event could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Generic transient failure
    RetriableError,
    /// Generic permanent failure
    NonRetriableError,
    /// The destination rejected the event payload itself
    InvalidEvent,
    /// Credentials were rejected for this event
    AuthenticationError,
    /// The destination throttled the request
    RateLimited,
    /// The destination answered with a server-side error
    ServerError,
    /// No answer within the adapter's deadline
    Timeout,
    /// Anything the adapter could not classify
    UnknownError,
}

impl ErrorCode {
    /// Stable numeric id stored in the ledger
    pub fn id(&self) -> i64 {
        match self {
            ErrorCode::RetriableError => 10,
            ErrorCode::NonRetriableError => 11,
            ErrorCode::InvalidEvent => 20,
            ErrorCode::AuthenticationError => 30,
            ErrorCode::RateLimited => 40,
            ErrorCode::ServerError => 50,
            ErrorCode::Timeout => 51,
            ErrorCode::UnknownError => 99,
        }
    }

    /// Inverse of [`ErrorCode::id`]; unknown ids collapse to `UnknownError`
    pub fn from_id(id: i64) -> Self {
        match id {
            10 => ErrorCode::RetriableError,
            11 => ErrorCode::NonRetriableError,
            20 => ErrorCode::InvalidEvent,
            30 => ErrorCode::AuthenticationError,
            40 => ErrorCode::RateLimited,
            50 => ErrorCode::ServerError,
            51 => ErrorCode::Timeout,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Classify a non-success HTTP status returned for one event
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 404 | 409 | 413 | 422 => ErrorCode::InvalidEvent,
            401 | 403 => ErrorCode::AuthenticationError,
            408 => ErrorCode::Timeout,
            429 => ErrorCode::RateLimited,
            500..=599 => ErrorCode::ServerError,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Whether a later retry-mode run has a chance of delivering the event
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RetriableError
                | ErrorCode::RateLimited
                | ErrorCode::ServerError
                | ErrorCode::Timeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::RetriableError => "retriable_error",
            ErrorCode::NonRetriableError => "non_retriable_error",
            ErrorCode::InvalidEvent => "invalid_event",
            ErrorCode::AuthenticationError => "authentication_error",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::ServerError => "server_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::UnknownError => "unknown_error",
        };
        f.write_str(name)
    }
}
