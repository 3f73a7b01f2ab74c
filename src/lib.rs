/*!
 * audit-export - incremental export of an organization audit log
 *
 * Each invocation runs one export cycle:
 * - look up the latest checkpoint and plan the next time window
 * - fetch every audit event of that window, following pagination cursors
 * - write the events as one compressed NDJSON object to S3
 * - append a checkpoint recording the exported window to DynamoDB
 *
 * The pipeline itself only talks to the `AuditSource`, `ArchiveStore`,
 * `CheckpointStore` and `Clock` traits; `protocol` holds the AWS and GitHub
 * backends and `testing` (behind the `testing` feature) holds in-memory ones.
 */

pub mod compression;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod protocol;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::{CompressionType, ExporterConfig, LogFormat, SortOrder};
pub use error::{ExportError, Result};
pub use pipeline::{
    Checkpoint, CommitOutcome, CycleReport, ExportContext, ExportSettings, Orchestrator,
    TimeWindow,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
