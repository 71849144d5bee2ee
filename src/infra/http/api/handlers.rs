//! Aggregate API handlers.
//!
//! These endpoints are polled every second or two while a show is on air, so
//! event/question metadata comes out of the bundle cache and only the live
//! engagement counts hit the store (through the retry wrapper).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
};
use tracing::warn;

use crate::cache::EventBundle;
use crate::domain::entities::QuestionRecord;
use crate::domain::tokens::{EVENT_TOKEN_PREFIX, QUESTION_TOKEN_PREFIX};
use crate::infra::db::retry;
use crate::infra::http::AppState;
use crate::infra::http::middleware::RequestContext;

use super::error::ApiError;
use super::models::{
    ChoiceBreakdown, EventEngagement, EventSummary, QuestionDetail, QuestionDigest,
    QuestionEngagement, QuestionsIndex, SlugChoiceBreakdown,
};

/// GET `/api/events/{event}` — event state with engagement summary.
pub async fn event_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(event): Path<String>,
) -> Result<Json<EventSummary>, ApiError> {
    let bundle = resolve_bundle(&state, &ctx, &event).await?;

    let total = retry::with_retry(ctx.cancellation(), &state.retry, || {
        state.responses.event_engagement(&bundle.event.event_id)
    })
    .await
    .map_err(|err| ApiError::from_retry(err, "Event not found"))?;

    let by_slug = retry::with_retry(ctx.cancellation(), &state.retry, || {
        state
            .responses
            .event_engagement_by_slug(&bundle.event.event_id)
    })
    .await
    .map_err(|err| ApiError::from_retry(err, "Event not found"))?;

    // Per-question rollups are summary garnish; one failing question is
    // skipped (and logged) rather than failing the whole payload.
    let mut questions = Vec::with_capacity(bundle.questions.len());
    for question in &bundle.questions {
        match retry::with_retry(ctx.cancellation(), &state.retry, || {
            state.responses.question_engagement(&question.question_id)
        })
        .await
        {
            Ok(tally) => questions.push(QuestionDigest {
                question_id: question.question_id.clone(),
                index: question.question_index,
                big_text: question.big_text.clone(),
                sessions: tally.sessions,
                total_votes: tally.total_votes,
            }),
            Err(err) => {
                warn!(
                    target = "pollcast::http::api",
                    question_id = %question.question_id,
                    error = %err,
                    "Question engagement lookup failed, omitting from summary"
                );
            }
        }
    }

    Ok(Json(EventSummary {
        event_id: bundle.event.event_id.clone(),
        description: bundle.event.description.clone(),
        created_at: bundle.event.created_at,
        total_questions: bundle.total_questions(),
        engagement: EventEngagement { total, by_slug },
        questions,
    }))
}

/// GET `/api/events/{event}/questions` — every question with engagement.
pub async fn event_questions(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(event): Path<String>,
) -> Result<Json<QuestionsIndex>, ApiError> {
    let bundle = resolve_bundle(&state, &ctx, &event).await?;

    let mut questions = Vec::with_capacity(bundle.questions.len());
    for question in &bundle.questions {
        match question_detail_payload(&state, &ctx, question).await {
            Ok(detail) => questions.push(detail),
            Err(err) => {
                warn!(
                    target = "pollcast::http::api",
                    question_id = %question.question_id,
                    error = ?err,
                    "Question detail lookup failed, omitting from index"
                );
            }
        }
    }

    Ok(Json(QuestionsIndex {
        event_id: bundle.event.event_id.clone(),
        questions,
    }))
}

/// GET `/api/events/{event}/questions/{question}` — one question in full.
///
/// `{question}` is either a `question_…` id or a 1-based index. This is the
/// endpoint graphics poll while a question is on screen.
pub async fn question_detail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((event, question)): Path<(String, String)>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let bundle = resolve_bundle(&state, &ctx, &event).await?;

    let record = if question.starts_with(QUESTION_TOKEN_PREFIX) {
        let record = retry::with_retry(ctx.cancellation(), &state.retry, || {
            state.questions.question_by_id(&question)
        })
        .await
        .map_err(|err| ApiError::from_retry(err, "Question not found"))?;
        // An id from another event's question set is as good as unknown.
        if record.event_id != bundle.event.event_id {
            return Err(ApiError::not_found("Question not found"));
        }
        record
    } else {
        let index: i32 = question
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid question identifier"))?;
        retry::with_retry(ctx.cancellation(), &state.retry, || {
            state
                .questions
                .question_by_event_and_index(&bundle.event.event_id, index)
        })
        .await
        .map_err(|err| ApiError::from_retry(err, "Question not found"))?
    };

    let detail = question_detail_payload(&state, &ctx, &record)
        .await
        .map_err(|err| ApiError::from_retry(err, "Question not found"))?;

    Ok(Json(detail))
}

/// Resolve `{event}` — an `event_…` id or a slug — to a cached bundle.
async fn resolve_bundle(
    state: &AppState,
    ctx: &RequestContext,
    event: &str,
) -> Result<Arc<EventBundle>, ApiError> {
    let slug = if event.starts_with(EVENT_TOKEN_PREFIX) {
        let record = retry::with_retry(ctx.cancellation(), &state.retry, || {
            state.events.event_by_id(event)
        })
        .await
        .map_err(|err| ApiError::from_retry(err, "Event not found"))?;
        record.slug
    } else {
        event.to_string()
    };

    state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(ApiError::from_lookup)
}

async fn question_detail_payload(
    state: &AppState,
    ctx: &RequestContext,
    question: &QuestionRecord,
) -> Result<QuestionDetail, retry::RetryError> {
    let total = retry::with_retry(ctx.cancellation(), &state.retry, || {
        state.responses.question_engagement(&question.question_id)
    })
    .await?;

    let by_slug = retry::with_retry(ctx.cancellation(), &state.retry, || {
        state
            .responses
            .question_engagement_by_slug(&question.question_id)
    })
    .await?;

    Ok(QuestionDetail {
        question_id: question.question_id.clone(),
        event_id: question.event_id.clone(),
        index: question.question_index,
        big_text: question.big_text.clone(),
        small_text: question.small_text.clone(),
        image_url: question.image_filename.as_ref().map(|filename| {
            format!(
                "{}/static/images/{}",
                state.options.base_url.trim_end_matches('/'),
                filename
            )
        }),
        choice_a: question.choice_a.clone(),
        choice_b: question.choice_b.clone(),
        engagement: QuestionEngagement {
            total: ChoiceBreakdown::from(total),
            by_slug: by_slug.into_iter().map(SlugChoiceBreakdown::from).collect(),
        },
    })
}
