//! Repository traits describing persistence adapters.
//!
//! The HTTP layer and the cache facades only ever talk to these traits; the
//! Postgres implementations live in `infra::db`, and the integration suites
//! substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::entities::{EventRecord, QuestionRecord, ResponseRecord, SessionRecord};
use crate::domain::types::Choice;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpsertSessionParams {
    pub session_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertResponseParams {
    pub question_id: String,
    pub session_id: String,
    pub slug: String,
    pub choice: Choice,
}

/// Vote counts for one question across all sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuestionTally {
    pub sessions: i64,
    pub total_votes: i64,
    pub votes_a: i64,
    pub votes_b: i64,
}

/// Per-question counts broken out by the slug each vote arrived through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlugQuestionTally {
    pub slug: String,
    pub sessions: i64,
    pub total_votes: i64,
    pub votes_a: i64,
    pub votes_b: i64,
}

/// Participation counts for a whole event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventTally {
    pub sessions: i64,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlugEventTally {
    pub slug: String,
    pub sessions: i64,
    pub total_votes: i64,
}

#[async_trait]
pub trait EventsRepo: Send + Sync {
    async fn event_by_slug(&self, slug: &str) -> Result<EventRecord, RepoError>;
    async fn event_by_id(&self, event_id: &str) -> Result<EventRecord, RepoError>;
}

#[async_trait]
pub trait QuestionsRepo: Send + Sync {
    /// Questions for one event, ordered by ascending `question_index`.
    async fn questions_by_event(&self, event_id: &str) -> Result<Vec<QuestionRecord>, RepoError>;
    async fn question_by_id(&self, question_id: &str) -> Result<QuestionRecord, RepoError>;
    async fn question_by_event_and_index(
        &self,
        event_id: &str,
        question_index: i32,
    ) -> Result<QuestionRecord, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    /// Insert or update a session row. Contact fields that are `None` leave
    /// any previously stored value untouched.
    async fn upsert_session(&self, params: UpsertSessionParams) -> Result<(), RepoError>;
    async fn session_by_id(&self, session_id: &str) -> Result<SessionRecord, RepoError>;
}

#[async_trait]
pub trait ResponsesRepo: Send + Sync {
    async fn upsert_response(&self, params: UpsertResponseParams) -> Result<(), RepoError>;
    /// The caller's recorded answer for one question, if any. Absence is not
    /// an error on this path.
    async fn response_for_question_and_session(
        &self,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<ResponseRecord>, RepoError>;
    async fn responses_by_session_and_event(
        &self,
        session_id: &str,
        event_id: &str,
    ) -> Result<Vec<ResponseRecord>, RepoError>;
    async fn question_engagement(&self, question_id: &str) -> Result<QuestionTally, RepoError>;
    async fn question_engagement_by_slug(
        &self,
        question_id: &str,
    ) -> Result<Vec<SlugQuestionTally>, RepoError>;
    async fn event_engagement(&self, event_id: &str) -> Result<EventTally, RepoError>;
    async fn event_engagement_by_slug(
        &self,
        event_id: &str,
    ) -> Result<Vec<SlugEventTally>, RepoError>;
}

/// Liveness probe against the backing store, served on `/healthz`.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
