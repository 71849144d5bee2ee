pub mod api;
pub mod middleware;
pub mod session;
pub mod vote;

pub use middleware::RequestContext;
pub use session::{NoSessionBound, SessionIdentity, resolve_session};

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::error::ErrorReport;
use crate::application::repos::{
    EventsRepo, QuestionsRepo, ResponsesRepo, SessionsRepo, StoreHealth,
};
use crate::cache::{EventDataCache, SessionValidationCache};
use crate::infra::db::RetryConfig;

/// Request-path options resolved from settings at startup.
#[derive(Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub secure_cookie: bool,
    pub cookie_max_age: Duration,
    pub request_timeout: Duration,
}

/// Shared state handed to every handler: the two cache facades, the repo
/// surfaces they fall back to, and the retry policy. Constructed once at
/// startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub event_data: Arc<EventDataCache>,
    pub session_gate: Arc<SessionValidationCache>,
    pub events: Arc<dyn EventsRepo>,
    pub questions: Arc<dyn QuestionsRepo>,
    pub sessions: Arc<dyn SessionsRepo>,
    pub responses: Arc<dyn ResponsesRepo>,
    pub health: Arc<dyn StoreHealth>,
    pub retry: RetryConfig,
    pub options: HttpOptions,
}

/// Assemble the full router: health probe, aggregate API, and the
/// session-gated voting flow.
pub fn build_router(state: AppState) -> Router {
    let vote_routes = Router::new()
        .route("/{slug}", get(vote::redirect_to_first))
        .route(
            "/{slug}/question/{order}",
            get(vote::show_question).post(vote::submit_answer),
        )
        .route(
            "/{slug}/submit-info",
            get(vote::show_info_form).post(vote::submit_info),
        )
        .route("/{slug}/end", get(vote::show_end))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            session::session_gate,
        ));

    Router::new()
        .route("/healthz", get(health))
        .merge(api::build_api_router())
        .merge(vote_routes)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::set_request_context,
        ))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match state.health.ping().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
