//! Packaging a batch into one compressed NDJSON object
//!
//! Object keys are derived from the write time:
//! `{prefix}/{year}/{month}/{day}/{hour}/{timestamp}.json.{ext}`, where the
//! date segments are unpadded and `timestamp` is RFC 3339 with nanoseconds.
//! A retried or concurrent write therefore lands on a fresh key instead of
//! replacing an earlier archive.

use std::io::Write;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, SecondsFormat, Timelike, Utc};
use chrono_tz::Tz;
use tracing::info;

use super::fetch::ExportBatch;
use crate::compression::FrameEncoder;
use crate::config::CompressionType;
use crate::error::{ExportError, Result};

/// Content type of the uncompressed archive stream
pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";

/// A fully encoded archive ready for upload
#[derive(Debug, Clone)]
pub struct ArchiveObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: &'static str,
    pub content_encoding: &'static str,
}

/// Write-once blob storage
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store `object` and return its location (e.g. `s3://bucket/key`)
    async fn put(&self, object: ArchiveObject) -> Result<String>;
}

/// Build the object key for an archive written at `at`
pub fn archive_key(prefix: &str, at: DateTime<Utc>, time_zone: Tz, compression: CompressionType) -> String {
    let local = at.with_timezone(&time_zone);
    format!(
        "{}/{}/{}/{}/{}/{}.json.{}",
        prefix.trim_end_matches('/'),
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
        local.to_rfc3339_opts(SecondsFormat::Nanos, true),
        compression.extension()
    )
}

/// Serialize records one per line and compress the stream
pub fn encode_batch(batch: &ExportBatch, compression: CompressionType) -> Result<Bytes> {
    let mut encoder = FrameEncoder::new(compression)?;
    for record in batch.iter() {
        serde_json::to_writer(&mut encoder, record)?;
        encoder
            .write_all(b"\n")
            .map_err(|e| ExportError::Compression(e.to_string()))?;
    }
    Ok(Bytes::from(encoder.finish()?))
}

/// Serializes batches and writes them to an [`ArchiveStore`]
pub struct ArchiveWriter<'a> {
    store: &'a dyn ArchiveStore,
    prefix: String,
    compression: CompressionType,
    time_zone: Tz,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(
        store: &'a dyn ArchiveStore,
        prefix: impl Into<String>,
        compression: CompressionType,
        time_zone: Tz,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            compression,
            time_zone,
        }
    }

    /// Persist `batch` as one object.
    ///
    /// An empty batch writes nothing and returns `Ok(None)`; an empty
    /// window is still a successful export.
    pub async fn write(&self, batch: &ExportBatch, at: DateTime<Utc>) -> Result<Option<String>> {
        if batch.is_empty() {
            info!(window = %batch.window, "nothing to upload");
            return Ok(None);
        }

        let body = encode_batch(batch, self.compression)?;
        let object = ArchiveObject {
            key: archive_key(&self.prefix, at, self.time_zone, self.compression),
            body,
            content_type: CONTENT_TYPE_NDJSON,
            content_encoding: self.compression.content_encoding(),
        };
        let size = object.body.len();

        let location = self.store.put(object).await?;
        info!(
            location = %location,
            records = batch.len(),
            bytes = size,
            "successfully uploaded archive"
        );
        Ok(Some(location))
    }
}
