//! Recording provider for tests and dry runs

use super::{RawEmailProvider, RawSendRequest};
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Provider that captures submitted messages instead of sending them
#[derive(Clone)]
pub struct RecordingProvider {
    sent: Arc<Mutex<Vec<RawSendRequest>>>,
    failure_message: Option<String>,
}

impl RecordingProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failure_message: None,
        }
    }

    /// Create a mock provider that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failure_message: Some(message.into()),
        }
    }

    /// Get all submitted requests
    pub async fn sent(&self) -> Vec<RawSendRequest> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Check if a message was submitted for a destination
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|r| r.destinations.iter().any(|d| d == address))
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawEmailProvider for RecordingProvider {
    async fn send_raw(&self, request: &RawSendRequest) -> Result<String> {
        if let Some(message) = &self.failure_message {
            return Err(eyre::eyre!(message.clone()));
        }

        let mut sent = self.sent.lock().await;
        sent.push(request.clone());
        Ok(format!("recorded-{}", sent.len()))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(to: &str) -> RawSendRequest {
        RawSendRequest {
            destinations: vec![to.to_string()],
            from_arn: None,
            data: b"Subject: test\r\n\r\nbody".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_recording_provider_records_requests() {
        let provider = RecordingProvider::new();

        let id = provider.send_raw(&request("user@example.com")).await.unwrap();
        assert_eq!(id, "recorded-1");
        assert_eq!(provider.sent_count().await, 1);
        assert!(provider.was_sent_to("user@example.com").await);
        assert!(!provider.was_sent_to("other@example.com").await);
    }

    #[tokio::test]
    async fn test_recording_provider_fails() {
        let provider = RecordingProvider::failing("Simulated failure");

        let result = provider.send_raw(&request("user@example.com")).await;
        assert!(result.unwrap_err().to_string().contains("Simulated failure"));
        assert_eq!(provider.sent_count().await, 0);
    }
}
