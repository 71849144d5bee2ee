//! Cache-aside facade for per-event data.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::application::repos::{EventsRepo, QuestionsRepo, RepoError};
use crate::domain::entities::{EventRecord, QuestionRecord};
use crate::infra::db::retry::{self, RetryConfig, RetryError};

use super::ttl::TtlCache;

/// An event plus its full ordered question list, cached as one value.
///
/// Either fully present or absent; questions are sorted by ascending
/// `question_index` and all belong to `event`. Handed out as an `Arc`
/// snapshot, never mutated after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBundle {
    pub event: EventRecord,
    pub questions: Vec<QuestionRecord>,
}

impl EventBundle {
    /// The question at 1-based position `order`, if in range.
    pub fn question_at(&self, order: usize) -> Option<&QuestionRecord> {
        order.checked_sub(1).and_then(|i| self.questions.get(i))
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }
}

#[derive(Debug, Error)]
pub enum EventLookupError {
    /// The slug does not resolve to an event. Propagated from the store,
    /// never retried.
    #[error("no event for slug")]
    NotFound,
    /// The store could not answer: retries exhausted, or a permanent
    /// non-not-found fault.
    #[error("event store unavailable: {0}")]
    Unavailable(RepoError),
    #[error("request cancelled")]
    Cancelled,
}

/// Slug-keyed cache over "event + its questions".
///
/// Event configuration is effectively static once a broadcast is live, so a
/// long TTL is safe; out-of-band tooling that edits events calls
/// [`EventDataCache::invalidate_slug`]. Invalidation is best-effort: a
/// reader already in flight may observe the stale bundle once more.
pub struct EventDataCache {
    entries: Arc<TtlCache<Arc<EventBundle>>>,
    events: Arc<dyn EventsRepo>,
    questions: Arc<dyn QuestionsRepo>,
    ttl: Duration,
    retry: RetryConfig,
}

impl EventDataCache {
    pub fn new(
        events: Arc<dyn EventsRepo>,
        questions: Arc<dyn QuestionsRepo>,
        ttl: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            entries: Arc::new(TtlCache::new()),
            events,
            questions,
            ttl,
            retry,
        }
    }

    /// The bundle for `slug`, from cache when live, otherwise assembled from
    /// the store (each fetch through the retry wrapper) and cached.
    pub async fn bundle_by_slug(
        &self,
        cancel: &CancellationToken,
        slug: &str,
    ) -> Result<Arc<EventBundle>, EventLookupError> {
        if let Some(bundle) = self.entries.get(slug) {
            counter!("pollcast_event_cache_hit_total").increment(1);
            return Ok(bundle);
        }
        counter!("pollcast_event_cache_miss_total").increment(1);

        let event = retry::with_retry(cancel, &self.retry, || self.events.event_by_slug(slug))
            .await
            .map_err(map_retry_error)?;

        let questions = retry::with_retry(cancel, &self.retry, || {
            self.questions.questions_by_event(&event.event_id)
        })
        .await
        .map_err(map_retry_error)?;

        debug_assert!(
            questions.windows(2).all(|w| w[0].question_index < w[1].question_index),
            "questions must arrive sorted by ascending index"
        );

        let bundle = Arc::new(EventBundle { event, questions });
        self.entries.set(slug, Arc::clone(&bundle), self.ttl);

        debug!(
            target = "pollcast::cache::event_data",
            slug,
            questions = bundle.questions.len(),
            "Cached event bundle"
        );

        Ok(bundle)
    }

    /// Drop the cached bundle for one slug.
    pub fn invalidate_slug(&self, slug: &str) {
        self.entries.remove(slug);
    }

    /// Drop every cached bundle.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Number of live cached bundles, for monitoring.
    pub fn cached_bundles(&self) -> usize {
        self.entries.len()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        TtlCache::spawn_sweeper(&self.entries, interval, "event_data")
    }
}

fn map_retry_error(err: RetryError) -> EventLookupError {
    match err {
        RetryError::Aborted(RepoError::NotFound) => EventLookupError::NotFound,
        RetryError::Aborted(other) | RetryError::Exhausted(other) => {
            EventLookupError::Unavailable(other)
        }
        RetryError::Cancelled => EventLookupError::Cancelled,
    }
}
