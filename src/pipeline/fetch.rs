//! Exhaustive retrieval of one window from a cursor-paginated source
//!
//! The source hands back a page of records plus an optional continuation
//! cursor. Pages are requested until the cursor runs out; the page size is
//! only a hint and a short page does not mean the source is exhausted.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::window::TimeWindow;
use crate::config::{SortOrder, SourceConfig};
use crate::error::{ExportError, Result};

/// One audit event, kept exactly as the source returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecord(serde_json::Value);

impl AuditRecord {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Event time, when the record carries one.
    ///
    /// GitHub reports both `@timestamp` and `created_at` as epoch millis.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        ["@timestamp", "created_at"]
            .iter()
            .filter_map(|field| self.0.get(*field))
            .find_map(|v| v.as_i64())
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl From<serde_json::Value> for AuditRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Opaque continuation token; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// `None` for an empty token, which the source uses to signal the end
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        (!raw.is_empty()).then_some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One response from the source
#[derive(Debug, Clone, Default)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,

    /// Where the next page starts; `None` once the source is exhausted
    pub next: Option<Cursor>,
}

/// Fully rendered query sent with every page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub phrase: String,
    pub include: String,
    pub order: SortOrder,
    pub per_page: u32,
}

/// Static query options applied to every window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub include: String,
    pub order: SortOrder,
    pub per_page: u32,
    pub extra_phrase: Option<String>,
}

impl QueryOptions {
    pub fn query_for(&self, window: &TimeWindow) -> AuditQuery {
        let mut phrase = time_range_phrase(window);
        if let Some(extra) = self.extra_phrase.as_deref().map(str::trim) {
            if !extra.is_empty() {
                phrase.push(' ');
                phrase.push_str(extra);
            }
        }

        AuditQuery {
            phrase,
            include: self.include.clone(),
            order: self.order,
            per_page: self.per_page,
        }
    }
}

impl From<&SourceConfig> for QueryOptions {
    fn from(config: &SourceConfig) -> Self {
        Self {
            include: config.include.clone(),
            order: config.order,
            per_page: config.per_page,
            extra_phrase: config.phrase.clone(),
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            include: crate::config::DEFAULT_INCLUDE.to_string(),
            order: SortOrder::default(),
            per_page: crate::config::DEFAULT_PER_PAGE,
            extra_phrase: None,
        }
    }
}

/// Earliest and latest event time among `records` that carry one
pub fn event_span(records: &[AuditRecord]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    records
        .iter()
        .filter_map(AuditRecord::created_at)
        .fold(None, |span, at| match span {
            None => Some((at, at)),
            Some((oldest, newest)) => Some((oldest.min(at), newest.max(at))),
        })
}

/// Search phrase selecting `from <= created < to`.
///
/// Both bounds are UTC RFC 3339 at second precision, e.g.
/// `created:>=2024-05-01T10:00:00Z created:<2024-05-01T11:00:00Z`.
pub fn time_range_phrase(window: &TimeWindow) -> String {
    format!(
        "created:>={} created:<{}",
        window.from.to_rfc3339_opts(SecondsFormat::Secs, true),
        window.to.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Cursor-paginated audit event source
#[async_trait]
pub trait AuditSource: Send + Sync {
    /// Fetch one page; `after` is `None` for the first page
    async fn fetch_page(&self, query: &AuditQuery, after: Option<&Cursor>) -> Result<AuditPage>;
}

/// All records of one window, in the order the source returned them
#[derive(Debug, Clone)]
pub struct ExportBatch {
    pub window: TimeWindow,
    pub records: Vec<AuditRecord>,
}

impl ExportBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter()
    }
}

enum PageState {
    First,
    After(Cursor, HashSet<Cursor>),
    Exhausted,
}

/// Follows continuation cursors until the source runs dry
pub struct PaginatedFetcher<'a> {
    source: &'a dyn AuditSource,
    options: QueryOptions,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(source: &'a dyn AuditSource, options: QueryOptions) -> Self {
        Self { source, options }
    }

    /// Lazy, finite sequence of pages for `query`.
    ///
    /// Ends after the first page without a cursor. A page handing back any
    /// cursor already followed in this sequence yields a pagination error
    /// instead of looping forever.
    pub fn pages<'s>(&'s self, query: &'s AuditQuery) -> impl Stream<Item = Result<AuditPage>> + 's {
        let source: &'s dyn AuditSource = self.source;
        stream::try_unfold(PageState::First, move |state| async move {
            let (after, mut seen) = match state {
                PageState::Exhausted => return Ok(None),
                PageState::First => (None, HashSet::new()),
                PageState::After(cursor, seen) => (Some(cursor), seen),
            };

            let page = source.fetch_page(query, after.as_ref()).await?;

            let next_state = match &page.next {
                Some(next) => {
                    if let Some(sent) = after {
                        seen.insert(sent);
                    }
                    if seen.contains(next) {
                        return Err(ExportError::Pagination(format!(
                            "source returned a cursor that was already followed ({})",
                            next
                        )));
                    }
                    PageState::After(next.clone(), seen)
                }
                None => PageState::Exhausted,
            };

            Ok(Some((page, next_state)))
        })
    }

    /// Retrieve every record in `window`.
    ///
    /// Any failing request fails the whole fetch; a partial batch is never
    /// returned.
    pub async fn fetch_all(&self, window: &TimeWindow) -> Result<ExportBatch> {
        let query = self.options.query_for(window);
        info!(
            phrase = %query.phrase,
            include = %query.include,
            order = query.order.as_str(),
            per_page = query.per_page,
            "fetching audit entries"
        );

        let (records, pages) = self
            .pages(&query)
            .try_fold((Vec::new(), 0usize), |(mut records, pages), page| async move {
                debug!(
                    page = pages + 1,
                    records = page.records.len(),
                    more = page.next.is_some(),
                    "received page"
                );
                records.extend(page.records);
                Ok((records, pages + 1))
            })
            .await?;

        info!(records = records.len(), pages, "{} audit entries fetched", records.len());
        if let Some((oldest, newest)) = event_span(&records) {
            debug!(oldest = %oldest, newest = %newest, "event time range of fetched entries");
        }

        Ok(ExportBatch {
            window: *window,
            records,
        })
    }
}
