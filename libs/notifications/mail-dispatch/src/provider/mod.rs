//! Raw email provider implementations

pub mod mock;
pub mod ses;

pub use mock::RecordingProvider;
pub use ses::SesRawProvider;

use async_trait::async_trait;
use eyre::Result;

/// Validated submission handed to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSendRequest {
    /// Envelope recipients, including bcc
    pub destinations: Vec<String>,
    /// Verified sending identity authorizing the From address
    pub from_arn: Option<String>,
    pub data: Vec<u8>,
}

/// Trait for providers accepting fully serialized messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RawEmailProvider: Send + Sync {
    /// Submit the message, returning the provider-assigned message id
    async fn send_raw(&self, request: &RawSendRequest) -> Result<String>;

    /// Get provider name
    fn name(&self) -> &'static str;
}
