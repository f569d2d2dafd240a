//! Validation and submission of raw messages

use crate::assembler::RawEmailMessage;
use crate::error::SendError;
use crate::provider::{RawEmailProvider, RawSendRequest};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// SES accepts at most 50 recipients per message
pub const MAX_DESTINATIONS: usize = 50;

/// SES v2 raw message size limit (40 MiB)
pub const MAX_RAW_MESSAGE_BYTES: usize = 40 * 1024 * 1024;

/// Submits assembled messages through a provider
pub struct EmailSender<P: RawEmailProvider> {
    provider: Arc<P>,
    from_arn: Option<String>,
}

impl<P: RawEmailProvider> Clone for EmailSender<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            from_arn: self.from_arn.clone(),
        }
    }
}

impl<P: RawEmailProvider> EmailSender<P> {
    pub fn new(provider: P) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<P>) -> Self {
        Self {
            provider,
            from_arn: None,
        }
    }

    /// Authorize sending with a verified identity ARN
    pub fn with_from_arn(mut self, from_arn: Option<String>) -> Self {
        self.from_arn = from_arn;
        self
    }

    /// Validate the message and submit it, returning the provider message id.
    #[instrument(skip_all, fields(provider = self.provider.name(), destinations = message.destinations.len()))]
    pub async fn send(&self, message: &RawEmailMessage) -> Result<String, SendError> {
        let request = self.validate(message)?;

        let message_id = self.provider.send_raw(&request).await.map_err(|e| {
            error!(error = %e, "Provider rejected raw email");
            SendError::Provider {
                provider: self.provider.name(),
                message: format!("{:#}", e),
            }
        })?;

        debug!(message_id = %message_id, "Raw email submitted");
        Ok(message_id)
    }

    /// Check provider constraints without touching the network.
    pub fn validate(&self, message: &RawEmailMessage) -> Result<RawSendRequest, SendError> {
        if message.destinations.is_empty() {
            return Err(SendError::Validation(
                "at least one destination is required".to_string(),
            ));
        }
        if message.destinations.len() > MAX_DESTINATIONS {
            return Err(SendError::Validation(format!(
                "{} destinations exceeds the limit of {}",
                message.destinations.len(),
                MAX_DESTINATIONS
            )));
        }
        if let Some(blank) = message.destinations.iter().position(|d| d.trim().is_empty()) {
            return Err(SendError::Validation(format!(
                "destination #{} is empty",
                blank
            )));
        }
        if message.data.is_empty() {
            return Err(SendError::Validation("raw message data is empty".to_string()));
        }
        if message.data.len() > MAX_RAW_MESSAGE_BYTES {
            return Err(SendError::Validation(format!(
                "raw message is {} bytes, limit is {}",
                message.data.len(),
                MAX_RAW_MESSAGE_BYTES
            )));
        }
        if let Some(arn) = &self.from_arn {
            validate_identity_arn(arn)?;
        }

        Ok(RawSendRequest {
            destinations: message.destinations.iter().map(|d| d.trim().to_string()).collect(),
            from_arn: self.from_arn.clone(),
            data: message.data.clone(),
        })
    }
}

/// Accepts `arn:<partition>:ses:<region>:<account>:identity/<identity>`.
pub fn validate_identity_arn(arn: &str) -> Result<(), SendError> {
    let invalid = |reason: &str| SendError::Validation(format!("invalid from ARN '{}': {}", arn, reason));

    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err(invalid("expected arn:<partition>:ses:<region>:<account>:identity/<name>"));
    }
    if parts[1].is_empty() {
        return Err(invalid("missing partition"));
    }
    if parts[2] != "ses" {
        return Err(invalid("service must be 'ses'"));
    }
    if parts[3].is_empty() {
        return Err(invalid("missing region"));
    }
    if parts[4].len() != 12 || !parts[4].chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("account id must be 12 digits"));
    }
    match parts[5].strip_prefix("identity/") {
        Some(identity) if !identity.is_empty() => Ok(()),
        _ => Err(invalid("resource must be identity/<name>")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use crate::provider::{MockRawEmailProvider, RecordingProvider};

    const ARN: &str = "arn:aws:ses:us-east-1:123456789012:identity/example.com";

    fn message(destinations: &[&str]) -> RawEmailMessage {
        RawEmailMessage {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            from: "b@x.com".to_string(),
            content_type: ContentType::Html,
            attachments: Vec::new(),
            data: b"Subject: hi\r\n\r\nhello".to_vec(),
        }
    }

    fn unreachable_provider() -> MockRawEmailProvider {
        let mut provider = MockRawEmailProvider::new();
        provider.expect_send_raw().times(0);
        provider.expect_name().return_const("mocked");
        provider
    }

    #[test]
    fn test_validate_identity_arn() {
        assert!(validate_identity_arn(ARN).is_ok());
        assert!(validate_identity_arn(
            "arn:aws-us-gov:ses:us-gov-west-1:123456789012:identity/a@b.com"
        )
        .is_ok());

        for bad in [
            "",
            "example.com",
            "arn:aws:sns:us-east-1:123456789012:identity/example.com",
            "arn:aws:ses::123456789012:identity/example.com",
            "arn:aws:ses:us-east-1:1234:identity/example.com",
            "arn:aws:ses:us-east-1:123456789012:configuration-set/x",
            "arn:aws:ses:us-east-1:123456789012:identity/",
        ] {
            assert!(
                matches!(validate_identity_arn(bad), Err(SendError::Validation(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_send_returns_provider_message_id() {
        let provider = RecordingProvider::new();
        let sender = EmailSender::new(provider.clone()).with_from_arn(Some(ARN.to_string()));

        let id = sender
            .send(&message(&["a@x.com", "hidden@x.com"]))
            .await
            .unwrap();

        assert_eq!(id, "recorded-1");
        let sent = provider.sent().await;
        assert_eq!(sent[0].destinations, vec!["a@x.com", "hidden@x.com"]);
        assert_eq!(sent[0].from_arn.as_deref(), Some(ARN));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_provider() {
        let sender = EmailSender::new(unreachable_provider());

        let result = sender.send(&message(&[])).await;
        assert!(matches!(result, Err(SendError::Validation(_))));

        let result = sender.send(&message(&["a@x.com", "  "])).await;
        assert!(matches!(result, Err(SendError::Validation(_))));

        let many: Vec<String> = (0..=MAX_DESTINATIONS)
            .map(|i| format!("u{}@x.com", i))
            .collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        let result = sender.send(&message(&many)).await;
        assert!(matches!(result, Err(SendError::Validation(_))));

        let mut empty = message(&["a@x.com"]);
        empty.data.clear();
        assert!(matches!(
            sender.send(&empty).await,
            Err(SendError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_arn_skips_provider() {
        let sender = EmailSender::new(unreachable_provider())
            .with_from_arn(Some("not-an-arn".to_string()));

        let result = sender.send(&message(&["a@x.com"])).await;
        assert!(matches!(result, Err(SendError::Validation(_))));
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped() {
        let sender = EmailSender::new(RecordingProvider::failing("Throttling: rate exceeded"));

        match sender.send(&message(&["a@x.com"])).await {
            Err(SendError::Provider { provider, message }) => {
                assert_eq!(provider, "recording");
                assert!(message.contains("Throttling"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }
}
