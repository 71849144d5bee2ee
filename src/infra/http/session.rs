//! Session resolution middleware for the voting route group.
//!
//! Every request entering `/{slug}/…` leaves this middleware either
//! Authenticated — with a [`SessionIdentity`] bound to the request — or with
//! a terminal response. The validation cache keeps the per-request store
//! round-trip off the hot path; the identifier is bound for exactly the one
//! request that resolved it.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Extensions, Request, StatusCode, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::error::HttpError;
use crate::application::repos::{RepoError, UpsertSessionParams};
use crate::domain::tokens;
use crate::infra::db::retry::{self, RetryError};

use super::AppState;
use super::middleware::RequestContext;

pub const SESSION_COOKIE: &str = "vote_session";

/// The resolved session identifier, valid for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct SessionIdentity(Arc<str>);

impl SessionIdentity {
    fn new(session_id: &str) -> Self {
        Self(Arc::from(session_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A handler asked "who is asking" before the session middleware bound an
/// identity. Always a wiring bug, never a user error.
#[derive(Debug, Error)]
#[error("no session bound to request")]
pub struct NoSessionBound;

/// Typed accessor for the request-scoped session identity.
pub fn resolve_session(extensions: &Extensions) -> Result<SessionIdentity, NoSessionBound> {
    extensions
        .get::<SessionIdentity>()
        .cloned()
        .ok_or(NoSessionBound)
}

impl<S> FromRequestParts<S> for SessionIdentity
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(&parts.extensions).map_err(|err| {
            HttpError::from_error(
                "infra::http::session::SessionIdentity",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
        })
    }
}

/// Resolve or mint a voter session before the request reaches any handler.
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = match request.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.clone(),
        None => RequestContext::new(),
    };

    let jar = CookieJar::from_headers(request.headers());
    let presented = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string());

    match presented {
        None => {
            // Unauthenticated → Provisioning: mint, persist a placeholder
            // row, hand the cookie back.
            let session_id = tokens::mint_session_token();

            let persisted = retry::with_retry(ctx.cancellation(), &state.retry, || {
                state.sessions.upsert_session(UpsertSessionParams {
                    session_id: session_id.clone(),
                    ..Default::default()
                })
            })
            .await;

            if let Err(err) = persisted {
                warn!(
                    target = "pollcast::http::session",
                    error = %err,
                    path = %request.uri().path(),
                    "Session provisioning failed"
                );
                return HttpError::from_error(
                    "infra::http::session::mint",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not establish voter session",
                    &err,
                )
                .into_response();
            }

            state.session_gate.register(&session_id);

            debug!(
                target = "pollcast::http::session",
                session_id,
                path = %request.uri().path(),
                "New session created"
            );

            request
                .extensions_mut()
                .insert(SessionIdentity::new(&session_id));
            let mut response = next.run(request).await;

            let cookie = session_cookie(
                &session_id,
                state.options.secure_cookie,
                state.options.cookie_max_age,
            );
            if let Ok(value) = cookie.to_string().parse() {
                response.headers_mut().append(SET_COOKIE, value);
            }
            response
        }
        Some(session_id) if !tokens::is_well_formed_session_token(&session_id) => {
            // Structurally invalid cookies are terminal; no store call.
            HttpError::new(
                "infra::http::session::malformed",
                StatusCode::UNAUTHORIZED,
                "Invalid session",
                "structurally invalid session cookie",
            )
            .into_response()
        }
        Some(session_id) => {
            match state
                .session_gate
                .validate(ctx.cancellation(), &session_id)
                .await
            {
                Ok(()) => {
                    request
                        .extensions_mut()
                        .insert(SessionIdentity::new(&session_id));
                    next.run(request).await
                }
                Err(err) => {
                    // Not-found and unresolved store faults alike end in 401:
                    // a voter we cannot vouch for does not get to vote.
                    warn!(
                        target = "pollcast::http::session",
                        session_id,
                        error = %err,
                        path = %request.uri().path(),
                        "Session validation failed"
                    );
                    HttpError::from_error(
                        "infra::http::session::validate",
                        StatusCode::UNAUTHORIZED,
                        "Invalid session",
                        &err,
                    )
                    .into_response()
                }
            }
        }
    }
}

fn session_cookie(session_id: &str, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age.as_secs() as i64))
        .build()
}

/// Surface a retry outcome from a session-scoped write path.
pub(super) fn retry_error_to_http(source: &'static str, err: RetryError) -> HttpError {
    match err {
        RetryError::Aborted(RepoError::NotFound) => HttpError::not_found(source),
        RetryError::Exhausted(inner) => HttpError::from_error(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
            &inner,
        ),
        RetryError::Aborted(inner) => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &inner,
        ),
        RetryError::Cancelled => HttpError::new(
            source,
            StatusCode::REQUEST_TIMEOUT,
            "Request timed out",
            "request cancelled during store access",
        ),
    }
}
