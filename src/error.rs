/*!
 * Error types for the audit exporter
 */

use std::fmt;

use crate::protocol::s3::S3Error;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CYCLE_FAILED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Debug)]
pub enum ExportError {
    /// Missing or malformed configuration
    Config(String),

    /// The audit source rejected a request
    Source { status: u16, message: String },

    /// Transport failure talking to the audit source
    Http(reqwest::Error),

    /// The source returned a response that breaks the cursor protocol
    Pagination(String),

    /// A record or response body could not be (de)serialized
    Decode(String),

    /// Compressing the archive stream failed
    Compression(String),

    /// Writing the archive object failed
    Archive(S3Error),

    /// Reading or writing a checkpoint failed
    Checkpoint(String),

    /// A checkpoint with the same partition and creation time already exists
    CheckpointConflict { partition: String, created_at: String },
}

impl ExportError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Config(_) => EXIT_CONFIG,
            _ => EXIT_CYCLE_FAILED,
        }
    }

    /// Whether re-running the cycle later is likely to succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ExportError::Source { status, .. } => *status == 429 || *status >= 500,
            ExportError::Http(err) => err.is_timeout() || err.is_connect(),
            ExportError::Archive(err) => err.is_transient(),
            ExportError::Checkpoint(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExportError::Config(_) => ErrorCategory::Configuration,
            ExportError::Source { .. } | ExportError::Http(_) | ExportError::Pagination(_) => {
                ErrorCategory::Source
            }
            ExportError::Decode(_) | ExportError::Compression(_) => ErrorCategory::Codec,
            ExportError::Archive(_) => ErrorCategory::Archive,
            ExportError::Checkpoint(_) | ExportError::CheckpointConflict { .. } => {
                ErrorCategory::Checkpoint
            }
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration errors
    Configuration,
    /// Audit source (API, network, cursor protocol)
    Source,
    /// Serialization and compression
    Codec,
    /// Object storage writes
    Archive,
    /// Checkpoint store reads and writes
    Checkpoint,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Source => write!(f, "source"),
            ErrorCategory::Codec => write!(f, "codec"),
            ErrorCategory::Archive => write!(f, "archive"),
            ErrorCategory::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ExportError::Source { status, message } => {
                write!(f, "Audit source returned HTTP {}: {}", status, message)
            }
            ExportError::Http(err) => write!(f, "Audit source request failed: {}", err),
            ExportError::Pagination(msg) => write!(f, "Pagination error: {}", msg),
            ExportError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ExportError::Compression(msg) => write!(f, "Compression error: {}", msg),
            ExportError::Archive(err) => write!(f, "Archive write failed: {}", err),
            ExportError::Checkpoint(msg) => write!(f, "Checkpoint error: {}", msg),
            ExportError::CheckpointConflict {
                partition,
                created_at,
            } => write!(
                f,
                "Checkpoint already exists for partition {} at {}",
                partition, created_at
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Http(err) => Some(err),
            ExportError::Archive(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        ExportError::Http(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Decode(err.to_string())
    }
}

impl From<S3Error> for ExportError {
    fn from(err: S3Error) -> Self {
        ExportError::Archive(err)
    }
}
