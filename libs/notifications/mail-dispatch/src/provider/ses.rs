//! AWS SES v2 raw email provider
//!
//! Submits pre-built MIME messages with `SendEmail` and `EmailContent::Raw`.
//! Envelope recipients go into `Destination.ToAddresses`, so bcc addresses
//! are delivered without appearing in the message headers.

use super::{RawEmailProvider, RawSendRequest};
use async_trait::async_trait;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Destination, EmailContent, RawMessage};
use aws_sdk_sesv2::Client;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, error};

/// AWS SES raw email provider
#[derive(Clone)]
pub struct SesRawProvider {
    client: Client,
}

impl SesRawProvider {
    /// Create a new SesRawProvider with an existing AWS SES client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create from an already-loaded AWS SDK config
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl RawEmailProvider for SesRawProvider {
    async fn send_raw(&self, request: &RawSendRequest) -> Result<String> {
        let raw = RawMessage::builder()
            .data(Blob::new(request.data.clone()))
            .build()
            .wrap_err("Failed to build SES raw message")?;

        let destination = Destination::builder()
            .set_to_addresses(Some(request.destinations.clone()))
            .build();

        debug!(
            destinations = request.destinations.len(),
            size = request.data.len(),
            "Sending raw email via AWS SES"
        );

        let response = self
            .client
            .send_email()
            .destination(destination)
            .content(EmailContent::builder().raw(raw).build())
            .set_from_email_address_identity_arn(request.from_arn.clone())
            .send()
            .await
            .map_err(|e| {
                error!(error = %DisplayErrorContext(&e), "AWS SES send failed");
                eyre!("SES error: {}", DisplayErrorContext(&e))
            })?;

        let message_id = response
            .message_id()
            .map(str::to_string)
            .ok_or_else(|| eyre!("SES response did not include a message id"))?;

        debug!(message_id = %message_id, "Raw email accepted by AWS SES");
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "aws-ses"
    }
}
