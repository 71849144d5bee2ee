use async_trait::async_trait;

use crate::{
    application::repos::{QuestionsRepo, RepoError},
    domain::entities::QuestionRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct QuestionRow {
    question_id: String,
    event_id: String,
    question_index: i32,
    big_text: String,
    small_text: String,
    choice_a: String,
    choice_b: String,
    image_filename: Option<String>,
}

impl From<QuestionRow> for QuestionRecord {
    fn from(row: QuestionRow) -> Self {
        Self {
            question_id: row.question_id,
            event_id: row.event_id,
            question_index: row.question_index,
            big_text: row.big_text,
            small_text: row.small_text,
            choice_a: row.choice_a,
            choice_b: row.choice_b,
            image_filename: row.image_filename,
        }
    }
}

#[async_trait]
impl QuestionsRepo for PostgresRepositories {
    async fn questions_by_event(&self, event_id: &str) -> Result<Vec<QuestionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT question_id, event_id, question_index, big_text, small_text, \
                    choice_a, choice_b, image_filename \
             FROM questions \
             WHERE event_id = $1 \
             ORDER BY question_index ASC",
        )
        .bind(event_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(QuestionRecord::from).collect())
    }

    async fn question_by_id(&self, question_id: &str) -> Result<QuestionRecord, RepoError> {
        let row = sqlx::query_as::<_, QuestionRow>(
            "SELECT question_id, event_id, question_index, big_text, small_text, \
                    choice_a, choice_b, image_filename \
             FROM questions WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(QuestionRecord::from).ok_or(RepoError::NotFound)
    }

    async fn question_by_event_and_index(
        &self,
        event_id: &str,
        question_index: i32,
    ) -> Result<QuestionRecord, RepoError> {
        let row = sqlx::query_as::<_, QuestionRow>(
            "SELECT question_id, event_id, question_index, big_text, small_text, \
                    choice_a, choice_b, image_filename \
             FROM questions WHERE event_id = $1 AND question_index = $2",
        )
        .bind(event_id)
        .bind(question_index)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(QuestionRecord::from).ok_or(RepoError::NotFound)
    }
}
