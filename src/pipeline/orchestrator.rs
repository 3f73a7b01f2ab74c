//! One export cycle: Plan → Fetch → Write → Commit
//!
//! The checkpoint is committed strictly after the archive write has
//! succeeded (or was skipped for an empty window). A crash anywhere before
//! the commit leaves the previous checkpoint in place, so the next run
//! repeats the same window; a crash after the commit never re-exports it.
//! The price is at-least-once delivery: a repeated window may produce a
//! second archive containing the same records.

use std::fmt;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::archive::{ArchiveStore, ArchiveWriter};
use super::checkpoint::{Checkpoint, CheckpointLog, CheckpointStore};
use super::clock::Clock;
use super::fetch::{AuditSource, PaginatedFetcher, QueryOptions};
use super::window::{TimeWindow, WindowPlanner};
use crate::config::{CompressionType, ExporterConfig};
use crate::error::{ExportError, Result};

/// Per-deployment settings for the pipeline
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub window: Duration,
    pub time_zone: Tz,
    pub lookback_days: u32,
    pub query: QueryOptions,
    pub prefix: String,
    pub compression: CompressionType,
}

impl ExportSettings {
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            window: config.window,
            time_zone: config.time_zone,
            lookback_days: config.checkpoint.lookback_days,
            query: QueryOptions::from(&config.source),
            prefix: config.archive.prefix.clone(),
            compression: config.archive.compression,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
            time_zone: Tz::UTC,
            lookback_days: 0,
            query: QueryOptions::default(),
            prefix: crate::config::DEFAULT_FOLDER_PREFIX.to_string(),
            compression: CompressionType::default(),
        }
    }
}

/// Everything a cycle talks to, built once at startup
pub struct ExportContext {
    pub source: Box<dyn AuditSource>,
    pub archive: Box<dyn ArchiveStore>,
    pub checkpoints: Box<dyn CheckpointStore>,
    pub clock: Box<dyn Clock>,
    pub settings: ExportSettings,
}

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Planning,
    Fetching,
    Writing,
    Committing,
    Fatal,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Planning => "planning",
            CycleState::Fetching => "fetching",
            CycleState::Writing => "writing",
            CycleState::Committing => "committing",
            CycleState::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Result of the final commit step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Checkpoint),

    /// The archive is safe but the checkpoint did not advance; the next
    /// cycle will export this window again.
    Failed(String),
}

/// Summary of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: TimeWindow,
    pub cold_start: bool,
    pub records: usize,
    pub archive: Option<String>,
    pub commit: CommitOutcome,
}

impl CycleReport {
    pub fn committed(&self) -> bool {
        matches!(self.commit, CommitOutcome::Committed(_))
    }
}

/// Runs export cycles against an [`ExportContext`]
pub struct Orchestrator<'a> {
    ctx: &'a ExportContext,
    state: CycleState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a ExportContext) -> Self {
        Self {
            ctx,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn enter(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "cycle state");
        self.state = next;
    }

    fn fail(&mut self, err: ExportError) -> ExportError {
        error!(
            step = %self.state,
            category = %err.category(),
            transient = err.is_transient(),
            error = %err,
            "export cycle aborted; checkpoint not advanced"
        );
        self.enter(CycleState::Fatal);
        err
    }

    /// Run one cycle to completion.
    ///
    /// Returns `Err` when planning, fetching or writing fails; nothing is
    /// committed in that case. A failed commit is reported in the
    /// [`CycleReport`] rather than as an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let span = info_span!("export_cycle");
        self.run_steps().instrument(span).await
    }

    async fn run_steps(&mut self) -> Result<CycleReport> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let log = CheckpointLog::new(ctx.checkpoints.as_ref(), settings.time_zone)
            .with_lookback(settings.lookback_days);

        self.enter(CycleState::Planning);
        let now = ctx.clock.now();
        let previous = match log.latest(now).await {
            Ok(previous) => previous,
            Err(err) => return Err(self.fail(err)),
        };
        let window = match WindowPlanner::new(settings.window).next_window(previous.as_ref(), now) {
            Ok(window) => window,
            Err(err) => return Err(self.fail(err)),
        };
        let cold_start = previous.is_none();
        if cold_start {
            info!(window = %window, "no checkpoint found; starting from now");
        } else {
            info!(window = %window, "continuing from last checkpoint");
        }

        self.enter(CycleState::Fetching);
        let fetcher = PaginatedFetcher::new(ctx.source.as_ref(), settings.query.clone());
        let batch = match fetcher.fetch_all(&window).await {
            Ok(batch) => batch,
            Err(err) => return Err(self.fail(err)),
        };

        self.enter(CycleState::Writing);
        let writer = ArchiveWriter::new(
            ctx.archive.as_ref(),
            settings.prefix.as_str(),
            settings.compression,
            settings.time_zone,
        );
        let archive = match writer.write(&batch, ctx.clock.now()).await {
            Ok(location) => location,
            Err(err) => return Err(self.fail(err)),
        };

        self.enter(CycleState::Committing);
        let commit = match log.commit(&window, ctx.clock.now()).await {
            Ok(checkpoint) => {
                info!(
                    partition = %checkpoint.partition,
                    window = %window,
                    "checkpoint advanced"
                );
                CommitOutcome::Committed(checkpoint)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    window = %window,
                    "could not insert next checkpoint; window will be exported again"
                );
                CommitOutcome::Failed(err.to_string())
            }
        };

        self.enter(CycleState::Idle);
        Ok(CycleReport {
            window,
            cold_start,
            records: batch.len(),
            archive,
            commit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, MemoryArchiveStore, MemoryCheckpointStore, ScriptedSource};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn context(
        source: &ScriptedSource,
        archive: &MemoryArchiveStore,
        checkpoints: &MemoryCheckpointStore,
        clock: &FixedClock,
    ) -> ExportContext {
        ExportContext {
            source: Box::new(source.clone()),
            archive: Box::new(archive.clone()),
            checkpoints: Box::new(checkpoints.clone()),
            clock: Box::new(clock.clone()),
            settings: ExportSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_state_returns_to_idle_after_success() {
        let source = ScriptedSource::new().page(vec![json!({"a": 1}).into()], None);
        let archive = MemoryArchiveStore::new();
        let checkpoints = MemoryCheckpointStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let ctx = context(&source, &archive, &checkpoints, &clock);

        let mut orchestrator = Orchestrator::new(&ctx);
        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(orchestrator.state(), CycleState::Idle);
        assert!(report.cold_start);
        assert!(report.committed());
        assert_eq!(report.records, 1);
    }

    #[tokio::test]
    async fn test_state_is_fatal_after_fetch_error() {
        let source = ScriptedSource::new().error(500, "boom");
        let archive = MemoryArchiveStore::new();
        let checkpoints = MemoryCheckpointStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let ctx = context(&source, &archive, &checkpoints, &clock);

        let mut orchestrator = Orchestrator::new(&ctx);
        assert!(orchestrator.run_cycle().await.is_err());
        assert_eq!(orchestrator.state(), CycleState::Fatal);
    }

    #[tokio::test]
    async fn test_checkpoint_lookup_failure_is_fatal() {
        let source = ScriptedSource::new().page(vec![], None);
        let archive = MemoryArchiveStore::new();
        let checkpoints = MemoryCheckpointStore::new().fail_reads();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let ctx = context(&source, &archive, &checkpoints, &clock);

        let err = Orchestrator::new(&ctx).run_cycle().await.unwrap_err();

        assert!(matches!(err, ExportError::Checkpoint(_)));
        assert_eq!(source.calls(), 0);
        assert_eq!(checkpoints.put_calls(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CycleState::Committing.to_string(), "committing");
    }
}
