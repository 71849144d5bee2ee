use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{EventsRepo, RepoError},
    domain::entities::EventRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    slug: String,
    description: String,
    created_at: OffsetDateTime,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EventsRepo for PostgresRepositories {
    async fn event_by_slug(&self, slug: &str) -> Result<EventRecord, RepoError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, slug, description, created_at \
             FROM events WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(EventRecord::from).ok_or(RepoError::NotFound)
    }

    async fn event_by_id(&self, event_id: &str) -> Result<EventRecord, RepoError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, slug, description, created_at \
             FROM events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(EventRecord::from).ok_or(RepoError::NotFound)
    }
}
