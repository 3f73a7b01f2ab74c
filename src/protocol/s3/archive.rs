//! Archive store backed by an S3 bucket

use async_trait::async_trait;

use super::client::S3Client;
use crate::error::Result;
use crate::pipeline::{ArchiveObject, ArchiveStore};

/// Writes archive objects with `PutObject`
pub struct S3ArchiveStore {
    client: S3Client,
}

impl S3ArchiveStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    async fn put(&self, object: ArchiveObject) -> Result<String> {
        let location = self
            .client
            .put_object(
                &object.key,
                object.body,
                object.content_type,
                object.content_encoding,
            )
            .await?;
        Ok(location)
    }
}
