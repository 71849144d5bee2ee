//! Membership cache for session-identity validation.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::repos::{RepoError, SessionsRepo};
use crate::infra::db::retry::{self, RetryConfig, RetryError};

use super::ttl::TtlCache;

#[derive(Debug, Error)]
pub enum SessionValidationError {
    /// The store answered and the session does not exist.
    #[error("session is not known to the store")]
    Unknown,
    /// The store could not answer within the retry budget.
    #[error("session store unavailable: {0}")]
    Unavailable(RepoError),
    #[error("request cancelled")]
    Cancelled,
}

/// Short-TTL "this session id exists" cache.
///
/// A hit lets the session middleware skip the store entirely; the TTL keeps
/// a burst of requests from one active voter cheap while still noticing a
/// revoked or expired session within a few minutes.
pub struct SessionValidationCache {
    entries: Arc<TtlCache<()>>,
    sessions: Arc<dyn SessionsRepo>,
    ttl: Duration,
    retry: RetryConfig,
}

impl SessionValidationCache {
    pub fn new(sessions: Arc<dyn SessionsRepo>, ttl: Duration, retry: RetryConfig) -> Self {
        Self {
            entries: Arc::new(TtlCache::new()),
            sessions,
            ttl,
            retry,
        }
    }

    /// Confirm that `session_id` names an existing session, consulting the
    /// cache before falling back to the store through the retry wrapper.
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
    ) -> Result<(), SessionValidationError> {
        if self.entries.get(session_id).is_some() {
            counter!("pollcast_session_cache_hit_total").increment(1);
            return Ok(());
        }
        counter!("pollcast_session_cache_miss_total").increment(1);

        match retry::with_retry(cancel, &self.retry, || {
            self.sessions.session_by_id(session_id)
        })
        .await
        {
            Ok(_) => {
                self.entries.set(session_id, (), self.ttl);
                Ok(())
            }
            Err(RetryError::Aborted(RepoError::NotFound)) => Err(SessionValidationError::Unknown),
            Err(RetryError::Aborted(err)) | Err(RetryError::Exhausted(err)) => {
                Err(SessionValidationError::Unavailable(err))
            }
            Err(RetryError::Cancelled) => Err(SessionValidationError::Cancelled),
        }
    }

    /// Record a session that is known to exist (just minted, or just
    /// confirmed out of band) without a store round-trip.
    pub fn register(&self, session_id: &str) {
        self.entries.set(session_id, (), self.ttl);
    }

    /// Number of live validated sessions, for monitoring.
    pub fn cached_sessions(&self) -> usize {
        self.entries.len()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        TtlCache::spawn_sweeper(&self.entries, interval, "session_validation")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::application::repos::UpsertSessionParams;
    use crate::domain::entities::SessionRecord;

    use super::*;

    struct CountingSessions {
        lookups: AtomicU32,
        known: &'static str,
    }

    #[async_trait]
    impl SessionsRepo for CountingSessions {
        async fn upsert_session(&self, _params: UpsertSessionParams) -> Result<(), RepoError> {
            Ok(())
        }

        async fn session_by_id(&self, session_id: &str) -> Result<SessionRecord, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if session_id == self.known {
                Ok(SessionRecord {
                    session_id: session_id.into(),
                    name: None,
                    email: None,
                    mobile: None,
                    created_at: OffsetDateTime::UNIX_EPOCH,
                })
            } else {
                Err(RepoError::NotFound)
            }
        }
    }

    const KNOWN: &str = "voter_0123456789abcdef0123456789abcdef";

    fn cache_over(repo: &Arc<CountingSessions>, ttl: Duration) -> SessionValidationCache {
        SessionValidationCache::new(
            Arc::clone(repo) as Arc<dyn SessionsRepo>,
            ttl,
            RetryConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn miss_hits_store_once_then_cache_absorbs_the_burst() {
        let repo = Arc::new(CountingSessions {
            lookups: AtomicU32::new(0),
            known: KNOWN,
        });
        let cache = cache_over(&repo, Duration::from_secs(300));
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            cache.validate(&cancel, KNOWN).await.unwrap();
        }
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registered_session_validates_without_store_calls() {
        let repo = Arc::new(CountingSessions {
            lookups: AtomicU32::new(0),
            known: KNOWN,
        });
        let cache = cache_over(&repo, Duration::from_secs(300));
        let cancel = CancellationToken::new();

        cache.register(KNOWN);
        cache.validate(&cancel, KNOWN).await.unwrap();
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_is_rejected() {
        let repo = Arc::new(CountingSessions {
            lookups: AtomicU32::new(0),
            known: KNOWN,
        });
        let cache = cache_over(&repo, Duration::from_secs(300));
        let cancel = CancellationToken::new();

        let result = cache.validate(&cancel, "voter_ffffffffffffffffffffffffffffffff").await;
        assert!(matches!(result, Err(SessionValidationError::Unknown)));
        // Not-found is permanent; exactly one lookup.
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_triggers_revalidation() {
        let repo = Arc::new(CountingSessions {
            lookups: AtomicU32::new(0),
            known: KNOWN,
        });
        let cache = cache_over(&repo, Duration::from_secs(300));
        let cancel = CancellationToken::new();

        cache.validate(&cancel, KNOWN).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.validate(&cancel, KNOWN).await.unwrap();

        assert_eq!(repo.lookups.load(Ordering::SeqCst), 2);
    }
}
