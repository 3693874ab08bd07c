//! S3-backed artifact store.
//!
//! Works against AWS S3 or any S3-compatible endpoint (MinIO, R2) via
//! `S3_ENDPOINT_URL`.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::{ObjectStore, StorageError, StoredObject};

/// Bucket settings for the artifact store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Custom endpoint for S3-compatible services. `None` means AWS.
    pub endpoint_url: Option<String>,
}

impl StorageConfig {
    /// Read bucket settings from the environment.
    ///
    /// | Variable          | Default  |
    /// |-------------------|----------|
    /// | `S3_BUCKET`       | required |
    /// | `S3_ENDPOINT_URL` | unset    |
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            bucket: std::env::var("S3_BUCKET").map_err(|_| "S3_BUCKET must be set".to_string())?,
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
        })
    }
}

/// Artifact store over an S3 bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a client from ambient AWS credentials and the given
    /// bucket settings.
    pub async fn from_config(config: StorageConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            // Path-style addressing for S3-compatible endpoints.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(Client::from_conf(builder.build()), config.bucket)
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key, size, "artifact stored");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service)
                    if matches!(service.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => StorageError::Backend {
                    key: key.to_string(),
                    message: e.to_string(),
                },
            })?;

        let content_type = response
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}
