//! Builds the long-lived clients shared by every batch.

use crate::assembler::EmailAssembler;
use crate::attachment::{AttachmentResolver, ReqwestFetcher, S3ObjectStore};
use crate::config::{ConfigError, DispatchConfig, FromEnv};
use crate::error::{DispatchError, DispatchResult};
use crate::processor::BatchProcessor;
use crate::provider::SesRawProvider;
use crate::reporter::{ErrorReporter, NoopErrorReporter, WebhookErrorReporter};
use crate::sender::{validate_identity_arn, EmailSender};
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::{debug, info};

/// Load AWS settings.
///
/// Development uses the explicit region and, when set, a named profile.
/// Production relies on the default provider chain of the host.
pub async fn load_sdk_config(config: &DispatchConfig) -> DispatchResult<SdkConfig> {
    let mut loader = aws_config::from_env();

    if config.environment.is_development() {
        let region = config
            .aws_region
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("AWS_REGION".to_string()))?;
        loader = loader.region(aws_config::Region::new(region));
        if let Some(profile) = &config.aws_profile {
            debug!(profile = %profile, "Using AWS profile");
            loader = loader.profile_name(profile);
        }
    } else if let Some(region) = &config.aws_region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    let sdk_config = loader.load().await;
    if sdk_config.region().is_none() {
        return Err(DispatchError::Initialization(
            "no AWS region could be determined".to_string(),
        ));
    }
    Ok(sdk_config)
}

/// Build an SES-backed processor from configuration.
pub async fn initialize(config: DispatchConfig) -> DispatchResult<BatchProcessor<SesRawProvider>> {
    if let Some(arn) = &config.from_arn {
        validate_identity_arn(arn).map_err(|e| DispatchError::Initialization(e.to_string()))?;
    }

    let sdk_config = load_sdk_config(&config).await?;

    let http = ReqwestFetcher::new(config.http_timeout)
        .map_err(|e| DispatchError::Initialization(e.to_string()))?;
    let resolver = AttachmentResolver::from_config(
        Arc::new(S3ObjectStore::from_sdk_config(&sdk_config)),
        Arc::new(http),
        &config,
    );

    let sender = EmailSender::new(SesRawProvider::from_sdk_config(&sdk_config))
        .with_from_arn(config.from_arn.clone());

    let reporter: Arc<dyn ErrorReporter> = match &config.error_report_url {
        Some(url) => Arc::new(
            WebhookErrorReporter::new(url, config.http_timeout)
                .map_err(|e| DispatchError::Initialization(format!("{:#}", e)))?,
        ),
        None => Arc::new(NoopErrorReporter),
    };

    info!(
        environment = ?config.environment,
        region = ?sdk_config.region(),
        attachment_dir = %config.attachment_dir.display(),
        retain_attachments = config.retain_attachments(),
        "Mail dispatcher initialized"
    );

    Ok(BatchProcessor::new(EmailAssembler::new(resolver), sender).with_reporter(reporter))
}

/// Load `DispatchConfig` from the environment and build the processor.
pub async fn initialize_from_env() -> DispatchResult<BatchProcessor<SesRawProvider>> {
    initialize(DispatchConfig::from_env()?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[tokio::test]
    async fn test_development_requires_region() {
        let config = DispatchConfig {
            environment: Environment::Development,
            aws_region: None,
            ..DispatchConfig::default()
        };

        let err = load_sdk_config(&config).await.unwrap_err();
        assert!(err.is_batch_level());
        assert!(err.to_string().contains("AWS_REGION"));
    }

    #[tokio::test]
    async fn test_invalid_from_arn_fails_initialization() {
        let config = DispatchConfig {
            aws_region: Some("us-east-1".to_string()),
            from_arn: Some("example.com".to_string()),
            ..DispatchConfig::default()
        };

        match initialize(config).await {
            Err(DispatchError::Initialization(message)) => assert!(message.contains("example.com")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("initialization should fail"),
        }
    }
}
