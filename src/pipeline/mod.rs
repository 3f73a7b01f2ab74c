//! Incremental checkpointed export pipeline
//!
//! - [`checkpoint`]: where the last successful export ended
//! - [`window`]: which `[from, to)` range to export next
//! - [`fetch`]: exhaustive cursor-following retrieval of that range
//! - [`archive`]: compressed NDJSON packaging and upload
//! - [`orchestrator`]: sequencing and per-step failure policy

pub mod archive;
pub mod checkpoint;
pub mod clock;
pub mod fetch;
pub mod orchestrator;
pub mod window;

pub use archive::{archive_key, encode_batch, ArchiveObject, ArchiveStore, ArchiveWriter};
pub use checkpoint::{
    format_timestamp, parse_timestamp, partition_key, Checkpoint, CheckpointLog, CheckpointStore,
};
pub use clock::{Clock, SystemClock};
pub use fetch::{
    time_range_phrase, AuditPage, AuditQuery, AuditRecord, AuditSource, Cursor, ExportBatch,
    PaginatedFetcher, QueryOptions,
};
pub use orchestrator::{
    CommitOutcome, CycleReport, CycleState, ExportContext, ExportSettings, Orchestrator,
};
pub use window::{TimeWindow, WindowPlanner};
