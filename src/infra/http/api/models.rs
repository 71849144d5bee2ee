//! Typed response payloads for the aggregate API.
//!
//! Every endpoint serializes one of these named structs; graphics vendors
//! integrate against this shape, so fields are append-only.

use serde::Serialize;
use time::OffsetDateTime;

use crate::application::repos::{EventTally, QuestionTally, SlugEventTally, SlugQuestionTally};

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub event_id: String,
    pub description: String,
    pub created_at: OffsetDateTime,
    pub total_questions: usize,
    pub engagement: EventEngagement,
    pub questions: Vec<QuestionDigest>,
}

#[derive(Debug, Serialize)]
pub struct EventEngagement {
    pub total: EventTally,
    pub by_slug: Vec<SlugEventTally>,
}

/// One row of the per-question summary on the event endpoint.
#[derive(Debug, Serialize)]
pub struct QuestionDigest {
    pub question_id: String,
    pub index: i32,
    pub big_text: String,
    pub sessions: i64,
    pub total_votes: i64,
}

#[derive(Debug, Serialize)]
pub struct QuestionsIndex {
    pub event_id: String,
    pub questions: Vec<QuestionDetail>,
}

#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    pub question_id: String,
    pub event_id: String,
    pub index: i32,
    pub big_text: String,
    pub small_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub choice_a: String,
    pub choice_b: String,
    pub engagement: QuestionEngagement,
}

#[derive(Debug, Serialize)]
pub struct QuestionEngagement {
    pub total: ChoiceBreakdown,
    pub by_slug: Vec<SlugChoiceBreakdown>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceBreakdown {
    pub sessions: i64,
    pub total_votes: i64,
    pub votes_a: i64,
    pub votes_b: i64,
    pub percentage_a: f64,
    pub percentage_b: f64,
}

impl From<QuestionTally> for ChoiceBreakdown {
    fn from(tally: QuestionTally) -> Self {
        let (percentage_a, percentage_b) = vote_percentages(tally.votes_a, tally.votes_b);
        Self {
            sessions: tally.sessions,
            total_votes: tally.total_votes,
            votes_a: tally.votes_a,
            votes_b: tally.votes_b,
            percentage_a,
            percentage_b,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlugChoiceBreakdown {
    pub slug: String,
    pub sessions: i64,
    pub total_votes: i64,
    pub votes_a: i64,
    pub votes_b: i64,
    pub percentage_a: f64,
    pub percentage_b: f64,
}

impl From<SlugQuestionTally> for SlugChoiceBreakdown {
    fn from(tally: SlugQuestionTally) -> Self {
        let (percentage_a, percentage_b) = vote_percentages(tally.votes_a, tally.votes_b);
        Self {
            slug: tally.slug,
            sessions: tally.sessions,
            total_votes: tally.total_votes,
            votes_a: tally.votes_a,
            votes_b: tally.votes_b,
            percentage_a,
            percentage_b,
        }
    }
}

/// Vote split as percentages truncated to two decimal places. An unvoted
/// question reads 0/0 rather than NaN.
pub fn vote_percentages(votes_a: i64, votes_b: i64) -> (f64, f64) {
    let total = votes_a + votes_b;
    if total == 0 {
        return (0.0, 0.0);
    }
    let percentage_a = votes_a as f64 / total as f64 * 100.0;
    let percentage_b = votes_b as f64 / total as f64 * 100.0;
    (truncate_2dp(percentage_a), truncate_2dp(percentage_b))
}

fn truncate_2dp(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}
