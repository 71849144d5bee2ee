pub mod error;
pub mod handlers;
pub mod models;

use axum::{Router, routing::get};

use super::AppState;

/// Read-only aggregate endpoints polled by broadcast graphics.
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/api/events/{event}", get(handlers::event_summary))
        .route("/api/events/{event}/questions", get(handlers::event_questions))
        .route(
            "/api/events/{event}/questions/{question}",
            get(handlers::question_detail),
        )
}
