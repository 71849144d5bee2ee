use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        EventTally, QuestionTally, RepoError, ResponsesRepo, SlugEventTally, SlugQuestionTally,
        UpsertResponseParams,
    },
    domain::{entities::ResponseRecord, types::Choice},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ResponseRow {
    question_id: String,
    session_id: String,
    slug: String,
    choice: String,
    updated_at: OffsetDateTime,
}

impl TryFrom<ResponseRow> for ResponseRecord {
    type Error = RepoError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        let choice = Choice::parse(&row.choice).ok_or_else(|| {
            RepoError::from_persistence(format!("stored choice `{}` is not a/b", row.choice))
        })?;
        Ok(Self {
            question_id: row.question_id,
            session_id: row.session_id,
            slug: row.slug,
            choice,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TallyRow {
    sessions: i64,
    total_votes: i64,
    votes_a: i64,
    votes_b: i64,
}

#[derive(sqlx::FromRow)]
struct SlugTallyRow {
    slug: String,
    sessions: i64,
    total_votes: i64,
    votes_a: i64,
    votes_b: i64,
}

#[derive(sqlx::FromRow)]
struct EventTallyRow {
    sessions: i64,
    total_votes: i64,
}

#[derive(sqlx::FromRow)]
struct SlugEventTallyRow {
    slug: String,
    sessions: i64,
    total_votes: i64,
}

#[async_trait]
impl ResponsesRepo for PostgresRepositories {
    async fn upsert_response(&self, params: UpsertResponseParams) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO responses (question_id, session_id, slug, choice) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (question_id, session_id) DO UPDATE SET \
                 choice = EXCLUDED.choice, \
                 slug = EXCLUDED.slug, \
                 updated_at = now()",
        )
        .bind(&params.question_id)
        .bind(&params.session_id)
        .bind(&params.slug)
        .bind(params.choice.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn response_for_question_and_session(
        &self,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<ResponseRecord>, RepoError> {
        let row = sqlx::query_as::<_, ResponseRow>(
            "SELECT question_id, session_id, slug, choice, updated_at \
             FROM responses WHERE question_id = $1 AND session_id = $2",
        )
        .bind(question_id)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ResponseRecord::try_from).transpose()
    }

    async fn responses_by_session_and_event(
        &self,
        session_id: &str,
        event_id: &str,
    ) -> Result<Vec<ResponseRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ResponseRow>(
            "SELECT r.question_id, r.session_id, r.slug, r.choice, r.updated_at \
             FROM responses r \
             INNER JOIN questions q ON q.question_id = r.question_id \
             WHERE r.session_id = $1 AND q.event_id = $2 \
             ORDER BY q.question_index ASC",
        )
        .bind(session_id)
        .bind(event_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ResponseRecord::try_from).collect()
    }

    async fn question_engagement(&self, question_id: &str) -> Result<QuestionTally, RepoError> {
        let row = sqlx::query_as::<_, TallyRow>(
            "SELECT COUNT(DISTINCT session_id) AS sessions, \
                    COUNT(*) AS total_votes, \
                    COUNT(*) FILTER (WHERE choice = 'a') AS votes_a, \
                    COUNT(*) FILTER (WHERE choice = 'b') AS votes_b \
             FROM responses WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(QuestionTally {
            sessions: row.sessions,
            total_votes: row.total_votes,
            votes_a: row.votes_a,
            votes_b: row.votes_b,
        })
    }

    async fn question_engagement_by_slug(
        &self,
        question_id: &str,
    ) -> Result<Vec<SlugQuestionTally>, RepoError> {
        let rows = sqlx::query_as::<_, SlugTallyRow>(
            "SELECT slug, \
                    COUNT(DISTINCT session_id) AS sessions, \
                    COUNT(*) AS total_votes, \
                    COUNT(*) FILTER (WHERE choice = 'a') AS votes_a, \
                    COUNT(*) FILTER (WHERE choice = 'b') AS votes_b \
             FROM responses WHERE question_id = $1 \
             GROUP BY slug ORDER BY slug ASC",
        )
        .bind(question_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SlugQuestionTally {
                slug: row.slug,
                sessions: row.sessions,
                total_votes: row.total_votes,
                votes_a: row.votes_a,
                votes_b: row.votes_b,
            })
            .collect())
    }

    async fn event_engagement(&self, event_id: &str) -> Result<EventTally, RepoError> {
        let row = sqlx::query_as::<_, EventTallyRow>(
            "SELECT COUNT(DISTINCT r.session_id) AS sessions, \
                    COUNT(r.question_id) AS total_votes \
             FROM responses r \
             INNER JOIN questions q ON q.question_id = r.question_id \
             WHERE q.event_id = $1",
        )
        .bind(event_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(EventTally {
            sessions: row.sessions,
            total_votes: row.total_votes,
        })
    }

    async fn event_engagement_by_slug(
        &self,
        event_id: &str,
    ) -> Result<Vec<SlugEventTally>, RepoError> {
        let rows = sqlx::query_as::<_, SlugEventTallyRow>(
            "SELECT r.slug, \
                    COUNT(DISTINCT r.session_id) AS sessions, \
                    COUNT(r.question_id) AS total_votes \
             FROM responses r \
             INNER JOIN questions q ON q.question_id = r.question_id \
             WHERE q.event_id = $1 \
             GROUP BY r.slug ORDER BY r.slug ASC",
        )
        .bind(event_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SlugEventTally {
                slug: row.slug,
                sessions: row.sessions,
                total_votes: row.total_votes,
            })
            .collect())
    }
}
