//! Domain records mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::Choice;

/// A polling event as configured ahead of a broadcast. Immutable for the
/// lifetime of any cached copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub event_id: String,
    pub slug: String,
    pub description: String,
    pub created_at: OffsetDateTime,
}

/// A single question belonging to an event.
///
/// `question_index` is 1-based, dense, and unique within the owning event;
/// its ordering is significant end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionRecord {
    pub question_id: String,
    pub event_id: String,
    pub question_index: i32,
    pub big_text: String,
    pub small_text: String,
    pub choice_a: String,
    pub choice_b: String,
    pub image_filename: Option<String>,
}

/// A voter session. Contact fields stay unset until the visitor completes the
/// contact step; only the session's *existence* is ever cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub created_at: OffsetDateTime,
}

/// One recorded answer. The `(question_id, session_id)` pair is unique;
/// re-voting overwrites in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub question_id: String,
    pub session_id: String,
    pub slug: String,
    pub choice: Choice,
    pub updated_at: OffsetDateTime,
}
