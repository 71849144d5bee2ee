use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, SessionsRepo, UpsertSessionParams},
    domain::entities::SessionRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    name: Option<String>,
    email: Option<String>,
    mobile: Option<String>,
    created_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            name: row.name,
            email: row.email,
            mobile: row.mobile,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn upsert_session(&self, params: UpsertSessionParams) -> Result<(), RepoError> {
        // COALESCE keeps previously captured contact fields when the caller
        // passes None, so a racing placeholder upsert cannot wipe them.
        sqlx::query(
            "INSERT INTO sessions (session_id, name, email, mobile) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (session_id) DO UPDATE SET \
                 name = COALESCE(EXCLUDED.name, sessions.name), \
                 email = COALESCE(EXCLUDED.email, sessions.email), \
                 mobile = COALESCE(EXCLUDED.mobile, sessions.mobile)",
        )
        .bind(&params.session_id)
        .bind(&params.name)
        .bind(&params.email)
        .bind(&params.mobile)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn session_by_id(&self, session_id: &str) -> Result<SessionRecord, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, name, email, mobile, created_at \
             FROM sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(SessionRecord::from).ok_or(RepoError::NotFound)
    }
}
