use std::{process, sync::Arc};

use pollcast::{
    application::error::AppError,
    cache::{EventDataCache, SessionValidationCache},
    config,
    infra::{
        db::{PostgresRepositories, RetryConfig},
        error::InfraError,
        http::{self, AppState, HttpOptions},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, &settings.database)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = "pollcast::startup", "connected to database");

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let retry = RetryConfig::from(&settings.retry);

    let event_data = Arc::new(EventDataCache::new(
        repositories.clone(),
        repositories.clone(),
        settings.cache.event_bundle_ttl(),
        retry,
    ));
    let session_gate = Arc::new(SessionValidationCache::new(
        repositories.clone(),
        settings.cache.session_ttl(),
        retry,
    ));

    // Background sweeps run for the life of the process, independent of
    // request traffic.
    let sweep_interval = settings.cache.sweep_interval();
    let sweepers = [
        event_data.spawn_sweeper(sweep_interval),
        session_gate.spawn_sweeper(sweep_interval),
    ];

    let state = AppState {
        event_data,
        session_gate,
        events: repositories.clone(),
        questions: repositories.clone(),
        sessions: repositories.clone(),
        responses: repositories.clone(),
        health: repositories.clone(),
        retry,
        options: HttpOptions {
            base_url: settings.server.base_url.clone(),
            secure_cookie: settings.session.secure_cookie,
            cookie_max_age: settings.session.cookie_max_age(),
            request_timeout: settings.server.request_timeout(),
        },
    };

    let router = http::build_router(state);

    let addr = settings.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = "pollcast::startup", addr = %addr, "serving");

    let result = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    for sweeper in sweepers {
        sweeper.abort();
        let _ = sweeper.await;
    }

    result
}
