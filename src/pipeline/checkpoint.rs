//! Checkpoints (bookmarks) recording how far the export has progressed
//!
//! Every successful cycle appends one checkpoint describing the window it
//! just exported. Records are grouped by the calendar date they were created
//! on and ordered by creation time; the newest one in the current partition
//! is the current position. Records are never updated or deleted.
//!
//! There is no lock around the append. Exactly one exporter is expected to
//! run per partition at a time; two concurrent runs both see the same stale
//! checkpoint and export the same window twice.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::window::TimeWindow;
use crate::error::{ExportError, Result};

/// Date format of partition keys
pub const PARTITION_FORMAT: &str = "%Y-%m-%d";

/// Exported-through boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Creation date in the configured timezone (`YYYY-MM-DD`)
    pub partition: String,

    /// Creation time; sort key within a partition
    pub created_at: DateTime<Utc>,

    /// Inclusive start of the exported window
    pub window_start: DateTime<Utc>,

    /// Exclusive end of the exported window
    pub window_end: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        created_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        time_zone: Tz,
    ) -> Self {
        Self {
            partition: partition_key(created_at.with_timezone(&time_zone).date_naive()),
            created_at,
            window_start,
            window_end,
        }
    }

    /// Checkpoint recording that `window` has been exported
    pub fn completed(window: &TimeWindow, created_at: DateTime<Utc>, time_zone: Tz) -> Self {
        Self::new(created_at, window.from, window.to, time_zone)
    }
}

/// Format a date as a partition key
pub fn partition_key(date: NaiveDate) -> String {
    date.format(PARTITION_FORMAT).to_string()
}

/// Fixed-width RFC 3339 form used for stored timestamps.
///
/// Always UTC with nine fractional digits, so lexical order matches
/// chronological order when used as a sort key.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse any RFC 3339 timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExportError::Checkpoint(format!("Invalid timestamp '{}': {}", raw, e)))
}

/// Durable append-only checkpoint storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Most recently created checkpoint in `partition`, if any
    async fn latest(&self, partition: &str) -> Result<Option<Checkpoint>>;

    /// Append a new checkpoint. Must fail rather than replace an existing
    /// record with the same partition and creation time.
    async fn put(&self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Partition-aware view over a [`CheckpointStore`]
pub struct CheckpointLog<'a> {
    store: &'a dyn CheckpointStore,
    time_zone: Tz,
    lookback_days: u32,
}

impl<'a> CheckpointLog<'a> {
    pub fn new(store: &'a dyn CheckpointStore, time_zone: Tz) -> Self {
        Self {
            store,
            time_zone,
            lookback_days: 0,
        }
    }

    /// Also consult up to `days` earlier partitions when today's is empty
    pub fn with_lookback(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Partition keys searched at `now`, newest first
    pub fn partitions(&self, now: DateTime<Utc>) -> Vec<String> {
        let today = now.with_timezone(&self.time_zone).date_naive();
        (0..=self.lookback_days)
            .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
            .map(partition_key)
            .collect()
    }

    /// Current position, or `None` on cold start
    pub async fn latest(&self, now: DateTime<Utc>) -> Result<Option<Checkpoint>> {
        for partition in self.partitions(now) {
            if let Some(checkpoint) = self.store.latest(&partition).await? {
                return Ok(Some(checkpoint));
            }
            debug!(partition = %partition, "no checkpoint in partition");
        }
        Ok(None)
    }

    /// Append a checkpoint for a window that has just been exported
    pub async fn commit(&self, window: &TimeWindow, now: DateTime<Utc>) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::completed(window, now, self.time_zone);
        self.store.put(&checkpoint).await?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCheckpointStore;
    use chrono::TimeZone;

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_partition_uses_configured_timezone() {
        // 23:30 UTC is already the next day in Berlin (UTC+2 in May)
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();

        let utc_cp = Checkpoint::new(created, utc(1, 22), utc(1, 23), Tz::UTC);
        let berlin_cp = Checkpoint::new(created, utc(1, 22), utc(1, 23), chrono_tz::Europe::Berlin);

        assert_eq!(utc_cp.partition, "2024-05-01");
        assert_eq!(berlin_cp.partition, "2024-05-02");
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(utc(1, 9));
        let b = format_timestamp(utc(1, 10) + chrono::Duration::nanoseconds(1));

        assert_eq!(a, "2024-05-01T09:00:00.000000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), utc(1, 10) + chrono::Duration::nanoseconds(1));
    }

    #[test]
    fn test_parse_timestamp_accepts_offsets() {
        let parsed = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed, utc(1, 10));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_partitions_with_lookback() {
        let store = MemoryCheckpointStore::new();
        let log = CheckpointLog::new(&store, Tz::UTC).with_lookback(2);

        assert_eq!(
            log.partitions(utc(3, 0)),
            vec!["2024-05-03", "2024-05-02", "2024-05-01"]
        );
    }

    #[tokio::test]
    async fn test_latest_is_none_on_empty_partition() {
        let store = MemoryCheckpointStore::new();
        let log = CheckpointLog::new(&store, Tz::UTC);

        assert!(log.latest(utc(1, 12)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_returns_newest_in_today_partition() {
        let store = MemoryCheckpointStore::new();
        let log = CheckpointLog::new(&store, Tz::UTC);

        let first = TimeWindow::new(utc(1, 8), utc(1, 9)).unwrap();
        let second = TimeWindow::new(utc(1, 9), utc(1, 10)).unwrap();
        log.commit(&first, utc(1, 9)).await.unwrap();
        log.commit(&second, utc(1, 10)).await.unwrap();

        let latest = log.latest(utc(1, 11)).await.unwrap().unwrap();
        assert_eq!(latest.window_start, utc(1, 9));
        assert_eq!(latest.window_end, utc(1, 10));
    }

    #[tokio::test]
    async fn test_day_rollover_without_lookback_is_cold_start() {
        let store = MemoryCheckpointStore::new();
        let window = TimeWindow::new(utc(1, 22), utc(1, 23)).unwrap();
        CheckpointLog::new(&store, Tz::UTC)
            .commit(&window, utc(1, 23))
            .await
            .unwrap();

        let strict = CheckpointLog::new(&store, Tz::UTC);
        assert!(strict.latest(utc(2, 0)).await.unwrap().is_none());

        let bridging = CheckpointLog::new(&store, Tz::UTC).with_lookback(1);
        let found = bridging.latest(utc(2, 0)).await.unwrap().unwrap();
        assert_eq!(found.window_end, utc(1, 23));
    }

    #[tokio::test]
    async fn test_commit_refuses_duplicate_creation_time() {
        let store = MemoryCheckpointStore::new();
        let log = CheckpointLog::new(&store, Tz::UTC);
        let window = TimeWindow::new(utc(1, 8), utc(1, 9)).unwrap();

        log.commit(&window, utc(1, 9)).await.unwrap();
        let err = log.commit(&window, utc(1, 9)).await.unwrap_err();
        assert!(matches!(err, ExportError::CheckpointConflict { .. }));
    }
}
