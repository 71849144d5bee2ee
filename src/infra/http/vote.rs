//! Session-gated voting flow under `/{slug}`.
//!
//! Flow control mirrors a classic form funnel: answers and contact details
//! arrive as form posts, progress moves through 303 redirects, and view
//! payloads are typed JSON.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Form, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::form_urlencoded;

use crate::application::error::HttpError;
use crate::application::repos::{UpsertResponseParams, UpsertSessionParams};
use crate::cache::EventLookupError;
use crate::domain::{entities::QuestionRecord, types::Choice};
use crate::infra::db::retry;

use super::middleware::RequestContext;
use super::session::{SessionIdentity, retry_error_to_http};
use super::AppState;

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub slug: String,
    pub question_id: String,
    pub index: i32,
    pub total_questions: usize,
    pub big_text: String,
    pub small_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub choice_a: String,
    pub choice_b: String,
    /// The caller's previously recorded answer, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_choice: Option<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ContactErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ContactErrors {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct InfoFormView {
    pub slug: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub errors: ContactErrors,
}

#[derive(Debug, Serialize)]
pub struct EndView {
    pub slug: String,
    pub total_answers: usize,
}

#[derive(Debug, Deserialize)]
pub struct AnswerForm {
    #[serde(default)]
    pub choice: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// GET `/{slug}` — validate the slug and send the visitor to question 1.
pub async fn redirect_to_first(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
) -> Result<Redirect, HttpError> {
    state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(|err| lookup_error_to_http("infra::http::vote::redirect_to_first", err))?;

    Ok(Redirect::to(&format!("/{slug}/question/1")))
}

/// GET `/{slug}/question/{order}` — one question with the caller's state.
pub async fn show_question(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    session: SessionIdentity,
    Path((slug, order)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, HttpError> {
    let source = "infra::http::vote::show_question";
    let Some(order) = parse_order(&order) else {
        return Err(HttpError::not_found(source));
    };

    let bundle = state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(|err| lookup_error_to_http(source, err))?;

    let Some(question) = bundle.question_at(order) else {
        return Err(HttpError::not_found(source));
    };

    // Best-effort: losing the previous answer only means the voter may
    // re-answer, so a store fault degrades instead of failing the page.
    let existing_choice = match retry::with_retry(ctx.cancellation(), &state.retry, || {
        state
            .responses
            .response_for_question_and_session(&question.question_id, session.as_str())
    })
    .await
    {
        Ok(response) => response.map(|r| r.choice),
        Err(err) => {
            warn!(
                target = "pollcast::http::vote",
                slug,
                question_id = %question.question_id,
                error = %err,
                "Existing-answer lookup failed, continuing without it"
            );
            None
        }
    };

    let view = QuestionView {
        slug: slug.clone(),
        question_id: question.question_id.clone(),
        index: question.question_index,
        total_questions: bundle.total_questions(),
        big_text: question.big_text.clone(),
        small_text: question.small_text.clone(),
        image_url: image_url(&state.options.base_url, question),
        choice_a: question.choice_a.clone(),
        choice_b: question.choice_b.clone(),
        existing_choice,
        choice_error: query.get("error_choice").cloned(),
    };

    // Keep the back button honest: question state must always be refetched.
    Ok((
        [(axum::http::header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Json(view),
    )
        .into_response())
}

/// POST `/{slug}/question/{order}` — record an answer, advance the funnel.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    session: SessionIdentity,
    Path((slug, order)): Path<(String, String)>,
    Form(form): Form<AnswerForm>,
) -> Result<Redirect, HttpError> {
    let source = "infra::http::vote::submit_answer";
    let Some(order) = parse_order(&order) else {
        return Err(HttpError::not_found(source));
    };

    let bundle = state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(|err| lookup_error_to_http(source, err))?;

    let Some(question) = bundle.question_at(order) else {
        return Err(HttpError::not_found(source));
    };

    let Some(choice) = Choice::parse(&form.choice) else {
        let target = error_redirect(
            &format!("/{slug}/question/{order}"),
            &[("choice", "Please select an answer")],
            &[],
        );
        return Ok(Redirect::to(&target));
    };

    retry::with_retry(ctx.cancellation(), &state.retry, || {
        state.responses.upsert_response(UpsertResponseParams {
            question_id: question.question_id.clone(),
            session_id: session.as_str().to_string(),
            slug: slug.clone(),
            choice,
        })
    })
    .await
    .map_err(|err| retry_error_to_http(source, err))?;

    let target = if order == bundle.total_questions() {
        format!("/{slug}/submit-info")
    } else {
        format!("/{slug}/question/{}", order + 1)
    };
    Ok(Redirect::to(&target))
}

/// GET `/{slug}/submit-info` — contact step, echoing rejected input back.
pub async fn show_info_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(slug): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<InfoFormView>, HttpError> {
    state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(|err| lookup_error_to_http("infra::http::vote::show_info_form", err))?;

    let field = |name: &str| query.get(name).cloned().unwrap_or_default();
    Ok(Json(InfoFormView {
        slug,
        name: field("name"),
        email: field("email"),
        phone: field("phone"),
        errors: ContactErrors {
            name: query.get("error_name").cloned(),
            email: query.get("error_email").cloned(),
            phone: query.get("error_phone").cloned(),
        },
    }))
}

/// POST `/{slug}/submit-info` — capture contact details, finish the funnel.
pub async fn submit_info(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    session: SessionIdentity,
    Path(slug): Path<String>,
    Form(form): Form<ContactForm>,
) -> Result<Redirect, HttpError> {
    let source = "infra::http::vote::submit_info";

    let name = form.name.trim().to_string();
    let email = form.email.trim().to_string();
    let phone_input = form.phone.trim().to_string();

    let mut errors = ContactErrors::default();
    let mut normalized_phone = None;

    if name.is_empty() {
        errors.name = Some("Name is required".into());
    }
    if email.is_empty() {
        errors.email = Some("Email is required".into());
    } else if !is_plausible_email(&email) {
        errors.email = Some("Please enter a valid email address".into());
    }
    if phone_input.is_empty() {
        errors.phone = Some("Phone number is required".into());
    } else {
        match normalize_phone(&phone_input) {
            Some(normalized) => normalized_phone = Some(normalized),
            None => errors.phone = Some("Please enter a valid phone number".into()),
        }
    }

    if !errors.is_empty() {
        let mut error_pairs = Vec::new();
        if let Some(message) = &errors.name {
            error_pairs.push(("name", message.as_str()));
        }
        if let Some(message) = &errors.email {
            error_pairs.push(("email", message.as_str()));
        }
        if let Some(message) = &errors.phone {
            error_pairs.push(("phone", message.as_str()));
        }
        // Echo the voter's original input, not the normalized form.
        let target = error_redirect(
            &format!("/{slug}/submit-info"),
            &error_pairs,
            &[("name", &name), ("email", &email), ("phone", &phone_input)],
        );
        return Ok(Redirect::to(&target));
    }

    retry::with_retry(ctx.cancellation(), &state.retry, || {
        state.sessions.upsert_session(UpsertSessionParams {
            session_id: session.as_str().to_string(),
            name: Some(name.clone()),
            email: Some(email.clone()),
            mobile: normalized_phone.clone(),
        })
    })
    .await
    .map_err(|err| retry_error_to_http(source, err))?;

    Ok(Redirect::to(&format!("/{slug}/end")))
}

/// GET `/{slug}/end` — completion view with the caller's answer count.
pub async fn show_end(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    session: SessionIdentity,
    Path(slug): Path<String>,
) -> Result<Json<EndView>, HttpError> {
    let bundle = state
        .event_data
        .bundle_by_slug(ctx.cancellation(), &slug)
        .await
        .map_err(|err| lookup_error_to_http("infra::http::vote::show_end", err))?;

    // Best-effort count; a store fault degrades to zero rather than failing
    // the thank-you step.
    let total_answers = match retry::with_retry(ctx.cancellation(), &state.retry, || {
        state
            .responses
            .responses_by_session_and_event(session.as_str(), &bundle.event.event_id)
    })
    .await
    {
        Ok(responses) => responses.len(),
        Err(err) => {
            warn!(
                target = "pollcast::http::vote",
                slug,
                error = %err,
                "Answer-count lookup failed, reporting zero"
            );
            0
        }
    };

    Ok(Json(EndView { slug, total_answers }))
}

/// Parse a 1-based question order from its path segment. Anything that is
/// not a positive integer is treated as an unknown page.
fn parse_order(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|order| *order >= 1)
}

fn image_url(base_url: &str, question: &QuestionRecord) -> Option<String> {
    question
        .image_filename
        .as_ref()
        .map(|filename| format!("{}/static/images/{}", base_url.trim_end_matches('/'), filename))
}

/// Build a redirect target carrying `error_*` flags plus echoed input.
fn error_redirect(base: &str, errors: &[(&str, &str)], prefill: &[(&str, &str)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (field, message) in errors {
        query.append_pair(&format!("error_{field}"), message);
    }
    for (field, value) in prefill {
        if !value.is_empty() {
            query.append_pair(field, value);
        }
    }
    format!("{base}?{}", query.finish())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Normalize a phone number to E.164-ish digits, defaulting to the GB
/// country code for national `0…` input.
fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let (has_plus, digits) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !(7..=15).contains(&digits.len()) {
        return None;
    }
    if has_plus {
        Some(format!("+{digits}"))
    } else if let Some(national) = digits.strip_prefix('0') {
        Some(format!("+44{national}"))
    } else {
        Some(format!("+{digits}"))
    }
}

fn lookup_error_to_http(source: &'static str, err: EventLookupError) -> HttpError {
    match err {
        EventLookupError::NotFound => HttpError::not_found(source),
        EventLookupError::Unavailable(inner) => HttpError::from_error(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
            &inner,
        ),
        EventLookupError::Cancelled => HttpError::new(
            source,
            StatusCode::REQUEST_TIMEOUT,
            "Request timed out",
            "request cancelled during store access",
        ),
    }
}
