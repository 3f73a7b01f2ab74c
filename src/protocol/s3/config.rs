//! Configuration types for the S3 client

use super::error::{S3Error, S3Result};
use crate::config::ArchiveConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// S3 client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// Path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl S3Config {
    /// Create a new S3 config with required parameters
    pub fn new(bucket: String) -> Self {
        Self {
            bucket,
            endpoint: None,
            force_path_style: false,
            timeout_seconds: 300,
        }
    }

    /// Client settings for the archive bucket with a per-operation timeout
    pub fn for_archive(archive: &ArchiveConfig, timeout: Duration) -> Self {
        Self {
            endpoint: archive.endpoint.clone(),
            force_path_style: archive.force_path_style,
            timeout_seconds: timeout.as_secs(),
            ..Self::new(archive.bucket.clone())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> S3Result<()> {
        if self.bucket.is_empty() {
            return Err(S3Error::InvalidBucketName(
                "Bucket name cannot be empty".to_string(),
            ));
        }

        if !is_valid_bucket_name(&self.bucket) {
            return Err(S3Error::InvalidBucketName(format!(
                "Invalid bucket name: {}. Bucket names must be 3-63 characters, \
                 lowercase letters, numbers, hyphens, and periods only",
                self.bucket
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(S3Error::InvalidConfig(
                "Timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate S3 bucket name according to AWS rules
fn is_valid_bucket_name(name: &str) -> bool {
    let len = name.len();

    // Length check: 3-63 characters
    if !(3..=63).contains(&len) {
        return false;
    }

    // Must start and end with lowercase letter or number
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return false;
    }

    // Only lowercase letters, numbers, hyphens, and periods
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return false;
    }

    if name.contains("..") {
        return false;
    }

    // Cannot be formatted as IP address
    if name.split('.').count() == 4 && name.split('.').all(|s| s.parse::<u8>().is_ok()) {
        return false;
    }

    !name.starts_with("xn--") && !name.ends_with("-s3alias")
}
