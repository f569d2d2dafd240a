//! AWS S3 object store
//!
//! Reads attachment objects with `GetObject` using a client built once at
//! startup from the shared AWS SDK config.

use super::ObjectStore;
use crate::error::FetchError;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tracing::{debug, error};

/// Object store backed by AWS S3
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create from an already-loaded AWS SDK config
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    fn failure(bucket: &str, key: &str, message: String) -> FetchError {
        FetchError::ObjectStore {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(bucket, key, error = %DisplayErrorContext(&e), "S3 GetObject failed");
                Self::failure(bucket, key, DisplayErrorContext(&e).to_string())
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Self::failure(bucket, key, format!("failed to read body: {}", e)))?
            .into_bytes();

        debug!(bucket, key, size = data.len(), "Downloaded object");
        Ok(data.to_vec())
    }
}
