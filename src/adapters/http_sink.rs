//! HttpSink - blobs → one JSON POST per event

use crate::hooks::{optional_u64, required_str};
use crate::retry::{RetryConfig, RetryStrategy};
use crate::{
    Blob, ConnectorError, ConnectorResult, ErrorCode, HookParams, OutputAdapter, RetrySettings,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Output adapter posting every event as a JSON body to one endpoint
///
/// Non-success responses are classified with [`ErrorCode::from_http_status`];
/// retriable ones (5xx, 429, timeouts) are retried with exponential backoff
/// before the event is recorded as failed. A 401/403 response, or an endpoint
/// that refuses connections after every retry, aborts the run.
///
/// Parameters:
/// - `endpoint` (required): URL to POST to
/// - `timeout_ms` (optional, default 10000): per-request timeout
/// - `auth_token` (optional): sent as a bearer token
pub struct HttpSink {
    endpoint: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    retry_strategy: RetryStrategy,
}

enum Delivery {
    Delivered,
    Failed(ErrorCode),
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: &RetrySettings,
    ) -> ConnectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::fatal_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            endpoint: endpoint.into(),
            auth_token: None,
            client,
            retry_strategy: RetryStrategy::new(RetryConfig::from(retry)),
        })
    }

    pub fn from_params(params: &HookParams, retry: &RetrySettings) -> ConnectorResult<Self> {
        let endpoint = required_str(params, "endpoint")?;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConnectorError::config(format!(
                "endpoint must be an http(s) URL: {endpoint}"
            )));
        }
        let timeout_ms = optional_u64(params, "timeout_ms")?.unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut sink = Self::new(endpoint, Duration::from_millis(timeout_ms), retry)?;
        sink.auth_token = params
            .get("auth_token")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(sink)
    }

    /// Attach a bearer token to every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    async fn deliver(&self, event: &Value) -> ConnectorResult<Delivery> {
        let mut attempt = 0;

        loop {
            let mut request = self.client.post(&self.endpoint).json(event);
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token);
            }

            let (code, unreachable) = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(Delivery::Delivered),
                Ok(response) => {
                    let status = response.status().as_u16();
                    if matches!(status, 401 | 403) {
                        return Err(ConnectorError::fatal(format!(
                            "{} rejected credentials (HTTP {})",
                            self.endpoint, status
                        )));
                    }
                    (ErrorCode::from_http_status(status), None)
                }
                Err(e) if e.is_timeout() => (ErrorCode::Timeout, None),
                Err(e) if e.is_connect() => (ErrorCode::RetriableError, Some(e)),
                Err(e) => {
                    warn!("Request to {} failed: {}", self.endpoint, e);
                    (ErrorCode::UnknownError, None)
                }
            };

            if code.is_retriable() && self.retry_strategy.should_retry(attempt) {
                attempt += 1;
                let backoff = self.retry_strategy.calculate_backoff(attempt);
                debug!(
                    "Retry attempt {} after {:?} - error code: {}",
                    attempt, backoff, code
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if let Some(e) = unreachable {
                return Err(ConnectorError::fatal_with_source(
                    format!("{} is unreachable", self.endpoint),
                    e,
                ));
            }
            return Ok(Delivery::Failed(code));
        }
    }
}

#[async_trait]
impl OutputAdapter for HttpSink {
    async fn send_events(&mut self, mut blob: Blob) -> ConnectorResult<Blob> {
        let mut failed = Vec::new();

        for (index, event) in blob.events.iter().enumerate() {
            if let Delivery::Failed(code) = self.deliver(event).await? {
                failed.push((index, event.clone(), code));
            }
        }

        let sent = blob.len() - failed.len();
        debug!(
            "Sent {}/{} event(s) of {}:{} to {}",
            sent,
            blob.len(),
            blob.location,
            blob.position,
            self.endpoint
        );

        let failed_count = failed.len();
        for (index, event, code) in failed {
            blob.append_failed_event(index, event, code);
        }
        blob.extend_reports(vec![json!({
            "endpoint": self.endpoint,
            "sent": sent,
            "failed": failed_count,
        })]);

        Ok(blob)
    }
}
