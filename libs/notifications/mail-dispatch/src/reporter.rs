//! Best-effort failure reporting
//!
//! A failed record is reported once; a reporter error is logged by the
//! processor and never changes the record's outcome.

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Summary of a record that could not be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub record_id: String,
    pub stage: &'static str,
    pub error: String,
    /// Empty when the body could not be decoded
    pub to: Vec<String>,
    pub subject: Option<String>,
}

/// Sink for record failures
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, failure: &RecordFailure) -> Result<()>;
}

/// Reporter that drops every failure
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorReporter;

#[async_trait]
impl ErrorReporter for NoopErrorReporter {
    async fn report(&self, _failure: &RecordFailure) -> Result<()> {
        Ok(())
    }
}

/// Reporter that POSTs each failure as JSON to an endpoint
#[derive(Clone)]
pub struct WebhookErrorReporter {
    client: Client,
    url: String,
}

impl WebhookErrorReporter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build error report HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ErrorReporter for WebhookErrorReporter {
    async fn report(&self, failure: &RecordFailure) -> Result<()> {
        self.client
            .post(&self.url)
            .json(failure)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to reach error endpoint {}", self.url))?
            .error_for_status()
            .wrap_err("Error endpoint rejected the report")?;
        Ok(())
    }
}
