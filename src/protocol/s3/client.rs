//! S3 client implementation

use super::config::S3Config;
use super::error::{S3Error, S3Result};
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::time::Duration;

/// S3 client for writing archive objects
#[derive(Clone)]
pub struct S3Client {
    /// AWS S3 client
    client: AwsS3Client,

    /// Client configuration
    config: S3Config,
}

impl S3Client {
    /// Create a client from an already loaded AWS configuration.
    ///
    /// Credentials and region come from `shared`; the exporter loads it once
    /// and hands it to both the S3 and DynamoDB clients.
    pub fn from_shared_config(shared: &SdkConfig, config: S3Config) -> S3Result<Self> {
        config.validate()?;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(shared);

        // Set custom endpoint if provided
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        // Force path-style addressing if configured (required for MinIO, LocalStack)
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        s3_config_builder = s3_config_builder.timeout_config(timeout_config);

        let client = AwsS3Client::from_conf(s3_config_builder.build());
        Ok(Self { client, config })
    }

    /// `s3://bucket/key` form of an object location
    pub fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key)
    }

    /// Upload a complete object with a single PutObject request
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        content_encoding: &str,
    ) -> S3Result<String> {
        if key.is_empty() || key.len() > 1024 {
            return Err(S3Error::InvalidKey(format!(
                "Object key must be 1-1024 bytes, got {}",
                key.len()
            )));
        }

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .content_encoding(content_encoding)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(S3Error::from)?;

        Ok(self.location(key))
    }
}
