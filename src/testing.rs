//! In-memory collaborators for exercising the pipeline without AWS or GitHub
//!
//! Every type here is a cheap handle around shared state: clone one into an
//! [`ExportContext`](crate::pipeline::ExportContext) and keep the original
//! to inspect what the cycle did.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{ExportError, Result};
use crate::pipeline::{
    ArchiveObject, ArchiveStore, AuditPage, AuditQuery, AuditRecord, AuditSource, Checkpoint,
    CheckpointStore, Clock, Cursor,
};
use crate::protocol::s3::S3Error;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Step {
    Page(Vec<AuditRecord>, Option<String>),
    Error(u16, String),
}

#[derive(Default)]
struct SourceState {
    steps: VecDeque<Step>,
    cursors_sent: Vec<Option<String>>,
    last_query: Option<AuditQuery>,
}

/// Audit source replaying a fixed script of pages and errors
#[derive(Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page; `next` is the cursor it hands back
    pub fn page(self, records: Vec<AuditRecord>, next: Option<&str>) -> Self {
        lock(&self.state)
            .steps
            .push_back(Step::Page(records, next.map(str::to_string)));
        self
    }

    /// Queue a failing response
    pub fn error(self, status: u16, message: &str) -> Self {
        lock(&self.state)
            .steps
            .push_back(Step::Error(status, message.to_string()));
        self
    }

    /// Number of page requests received
    pub fn calls(&self) -> usize {
        lock(&self.state).cursors_sent.len()
    }

    /// The `after` value of each request, in order
    pub fn cursors_sent(&self) -> Vec<Option<String>> {
        lock(&self.state).cursors_sent.clone()
    }

    pub fn last_query(&self) -> Option<AuditQuery> {
        lock(&self.state).last_query.clone()
    }
}

#[async_trait]
impl AuditSource for ScriptedSource {
    async fn fetch_page(&self, query: &AuditQuery, after: Option<&Cursor>) -> Result<AuditPage> {
        let mut state = lock(&self.state);
        state.cursors_sent.push(after.map(|c| c.as_str().to_string()));
        state.last_query = Some(query.clone());

        match state.steps.pop_front() {
            Some(Step::Page(records, next)) => Ok(AuditPage {
                records,
                next: next.and_then(Cursor::new),
            }),
            Some(Step::Error(status, message)) => Err(ExportError::Source { status, message }),
            None => Err(ExportError::Pagination(
                "scripted source has no more responses".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct CheckpointState {
    records: BTreeMap<(String, DateTime<Utc>), Checkpoint>,
    put_calls: usize,
    fail_reads: bool,
    fail_writes: bool,
}

/// Checkpoint store keeping records in a map
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<Mutex<CheckpointState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every lookup fail
    pub fn fail_reads(self) -> Self {
        lock(&self.state).fail_reads = true;
        self
    }

    /// Make every put fail
    pub fn fail_writes(self) -> Self {
        lock(&self.state).fail_writes = true;
        self
    }

    /// Insert a record directly, bypassing `put`
    pub fn seed(&self, checkpoint: Checkpoint) {
        lock(&self.state).records.insert(
            (checkpoint.partition.clone(), checkpoint.created_at),
            checkpoint,
        );
    }

    /// Number of `put` attempts, successful or not
    pub fn put_calls(&self) -> usize {
        lock(&self.state).put_calls
    }

    /// All records ordered by creation time
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        let mut all: Vec<Checkpoint> = lock(&self.state).records.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn latest(&self, partition: &str) -> Result<Option<Checkpoint>> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(ExportError::Checkpoint("lookup unavailable".to_string()));
        }
        Ok(state
            .records
            .values()
            .filter(|c| c.partition == partition)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = lock(&self.state);
        state.put_calls += 1;
        if state.fail_writes {
            return Err(ExportError::Checkpoint("write unavailable".to_string()));
        }

        let key = (checkpoint.partition.clone(), checkpoint.created_at);
        if state.records.contains_key(&key) {
            return Err(ExportError::CheckpointConflict {
                partition: checkpoint.partition.clone(),
                created_at: crate::pipeline::format_timestamp(checkpoint.created_at),
            });
        }
        state.records.insert(key, checkpoint.clone());
        Ok(())
    }
}

#[derive(Default)]
struct ArchiveState {
    objects: Vec<ArchiveObject>,
    put_calls: usize,
    fail: bool,
}

/// Object store keeping uploads in a list
#[derive(Clone, Default)]
pub struct MemoryArchiveStore {
    state: Arc<Mutex<ArchiveState>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every upload fails
    pub fn failing() -> Self {
        let store = Self::default();
        lock(&store.state).fail = true;
        store
    }

    pub fn put_calls(&self) -> usize {
        lock(&self.state).put_calls
    }

    /// Successfully stored objects, in upload order
    pub fn objects(&self) -> Vec<ArchiveObject> {
        lock(&self.state).objects.clone()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn put(&self, object: ArchiveObject) -> Result<String> {
        let mut state = lock(&self.state);
        state.put_calls += 1;
        if state.fail {
            return Err(S3Error::Network("simulated upload failure".to_string()).into());
        }
        let location = format!("memory://{}", object.key);
        state.objects.push(object);
        Ok(location)
    }
}

/// Manually driven clock
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
