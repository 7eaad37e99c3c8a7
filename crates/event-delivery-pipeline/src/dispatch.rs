//! Batch dispatch collaborators.

use crate::{FormattedBatch, PipelineResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResponse {
    /// HTTP-style status code reported by the collector.
    pub status_code: u16,
}

impl DispatchResponse {
    pub fn new(status_code: u16) -> Self {
        Self { status_code }
    }

    /// Whether the collector accepted the batch. Anything in `[200, 400)`
    /// counts; redirects are treated as delivered rather than retried.
    pub fn is_delivered(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}

/// Transport collaborator that carries a batch to the collector.
///
/// A non-success status is not an `Err`: classification is the
/// orchestrator's job. `Err` means the attempt itself failed (connection,
/// TLS, timeout).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, batch: &FormattedBatch) -> PipelineResult<DispatchResponse>;
}

/// Fire-and-forget observer, notified once per dispatch attempt regardless
/// of outcome.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, key: &str, batch: &FormattedBatch);
}

/// HTTP dispatcher configuration.
#[derive(Debug, Clone)]
pub struct HttpDispatcherConfig {
    /// Collector endpoint the batch payload is POSTed to.
    pub collector_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://localhost:8080/v1/batches".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Dispatcher that POSTs batch payloads as JSON over HTTP.
pub struct HttpDispatcher {
    config: HttpDispatcherConfig,
    client: Client,
}

impl HttpDispatcher {
    pub fn new(config: HttpDispatcherConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, batch: &FormattedBatch) -> PipelineResult<DispatchResponse> {
        debug!(url = %self.config.collector_url, "Dispatching batch");

        let response = self
            .client
            .post(&self.config.collector_url)
            .json(&batch.payload)
            .send()
            .await?;

        Ok(DispatchResponse::new(response.status().as_u16()))
    }
}
