//! Shared fixtures: an in-memory store implementing the repo traits, plus
//! request helpers for driving the full router.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tower::ServiceExt;

use pollcast::application::repos::{
    EventTally, EventsRepo, QuestionTally, QuestionsRepo, RepoError, ResponsesRepo, SessionsRepo,
    SlugEventTally, SlugQuestionTally, StoreHealth, UpsertResponseParams, UpsertSessionParams,
};
use pollcast::cache::{EventDataCache, SessionValidationCache};
use pollcast::domain::entities::{EventRecord, QuestionRecord, ResponseRecord, SessionRecord};
use pollcast::infra::db::RetryConfig;
use pollcast::infra::http::{AppState, HttpOptions, build_router};

#[derive(Default)]
pub struct InMemoryStore {
    events: Mutex<Vec<EventRecord>>,
    questions: Mutex<Vec<QuestionRecord>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    responses: Mutex<HashMap<(String, String), ResponseRecord>>,
    pub event_fetches: AtomicUsize,
    pub question_list_fetches: AtomicUsize,
    pub session_lookups: AtomicUsize,
    pub session_upserts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed an event with `question_count` questions and return its id.
    pub fn seed_event(&self, slug: &str, question_count: i32) -> String {
        let event_id = format!("event_{:032x}", slug.len() as u128 + 0xf00d);
        self.events.lock().unwrap().push(EventRecord {
            event_id: event_id.clone(),
            slug: slug.to_string(),
            description: format!("{slug} main card"),
            created_at: OffsetDateTime::UNIX_EPOCH,
        });
        let mut questions = self.questions.lock().unwrap();
        for index in 1..=question_count {
            questions.push(QuestionRecord {
                question_id: format!("question_{index:032x}"),
                event_id: event_id.clone(),
                question_index: index,
                big_text: format!("Who takes round {index}?"),
                small_text: "Tap to vote".to_string(),
                choice_a: "Red corner".to_string(),
                choice_b: "Blue corner".to_string(),
                image_filename: (index == 1).then(|| "round1.png".to_string()),
            });
        }
        event_id
    }

    /// Insert a session row directly, bypassing the middleware.
    pub fn seed_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            SessionRecord {
                session_id: session_id.to_string(),
                name: None,
                email: None,
                mobile: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
        );
    }

    /// Record a vote directly, bypassing the HTTP flow.
    pub fn seed_response(&self, question_id: &str, session_id: &str, slug: &str, choice: &str) {
        let choice = pollcast::domain::types::Choice::parse(choice).expect("seed choice");
        self.responses.lock().unwrap().insert(
            (question_id.to_string(), session_id.to_string()),
            ResponseRecord {
                question_id: question_id.to_string(),
                session_id: session_id.to_string(),
                slug: slug.to_string(),
                choice,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            },
        );
    }

    pub fn stored_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    fn question_ids_for_event(&self, event_id: &str) -> HashSet<String> {
        self.questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.event_id == event_id)
            .map(|q| q.question_id.clone())
            .collect()
    }
}

#[async_trait]
impl EventsRepo for InMemoryStore {
    async fn event_by_slug(&self, slug: &str) -> Result<EventRecord, RepoError> {
        self.event_fetches.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.slug == slug)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn event_by_id(&self, event_id: &str) -> Result<EventRecord, RepoError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl QuestionsRepo for InMemoryStore {
    async fn questions_by_event(&self, event_id: &str) -> Result<Vec<QuestionRecord>, RepoError> {
        self.question_list_fetches.fetch_add(1, Ordering::SeqCst);
        let mut questions: Vec<_> = self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.event_id == event_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_index);
        Ok(questions)
    }

    async fn question_by_id(&self, question_id: &str) -> Result<QuestionRecord, RepoError> {
        self.questions
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.question_id == question_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn question_by_event_and_index(
        &self,
        event_id: &str,
        question_index: i32,
    ) -> Result<QuestionRecord, RepoError> {
        self.questions
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.event_id == event_id && q.question_index == question_index)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl SessionsRepo for InMemoryStore {
    async fn upsert_session(&self, params: UpsertSessionParams) -> Result<(), RepoError> {
        self.session_upserts.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(params.session_id.clone())
            .or_insert_with(|| SessionRecord {
                session_id: params.session_id.clone(),
                name: None,
                email: None,
                mobile: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
            });
        if params.name.is_some() {
            entry.name = params.name;
        }
        if params.email.is_some() {
            entry.email = params.email;
        }
        if params.mobile.is_some() {
            entry.mobile = params.mobile;
        }
        Ok(())
    }

    async fn session_by_id(&self, session_id: &str) -> Result<SessionRecord, RepoError> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl ResponsesRepo for InMemoryStore {
    async fn upsert_response(&self, params: UpsertResponseParams) -> Result<(), RepoError> {
        self.responses.lock().unwrap().insert(
            (params.question_id.clone(), params.session_id.clone()),
            ResponseRecord {
                question_id: params.question_id,
                session_id: params.session_id,
                slug: params.slug,
                choice: params.choice,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            },
        );
        Ok(())
    }

    async fn response_for_question_and_session(
        &self,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<ResponseRecord>, RepoError> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&(question_id.to_string(), session_id.to_string()))
            .cloned())
    }

    async fn responses_by_session_and_event(
        &self,
        session_id: &str,
        event_id: &str,
    ) -> Result<Vec<ResponseRecord>, RepoError> {
        let question_ids = self.question_ids_for_event(event_id);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.session_id == session_id && question_ids.contains(&r.question_id))
            .cloned()
            .collect())
    }

    async fn question_engagement(&self, question_id: &str) -> Result<QuestionTally, RepoError> {
        let responses = self.responses.lock().unwrap();
        let mut tally = QuestionTally::default();
        let mut sessions = HashSet::new();
        for record in responses.values().filter(|r| r.question_id == question_id) {
            sessions.insert(record.session_id.clone());
            tally.total_votes += 1;
            match record.choice {
                pollcast::domain::types::Choice::A => tally.votes_a += 1,
                pollcast::domain::types::Choice::B => tally.votes_b += 1,
            }
        }
        tally.sessions = sessions.len() as i64;
        Ok(tally)
    }

    async fn question_engagement_by_slug(
        &self,
        question_id: &str,
    ) -> Result<Vec<SlugQuestionTally>, RepoError> {
        let responses = self.responses.lock().unwrap();
        let mut by_slug: HashMap<String, (HashSet<String>, i64, i64, i64)> = HashMap::new();
        for record in responses.values().filter(|r| r.question_id == question_id) {
            let entry = by_slug.entry(record.slug.clone()).or_default();
            entry.0.insert(record.session_id.clone());
            entry.1 += 1;
            match record.choice {
                pollcast::domain::types::Choice::A => entry.2 += 1,
                pollcast::domain::types::Choice::B => entry.3 += 1,
            }
        }
        let mut tallies: Vec<_> = by_slug
            .into_iter()
            .map(|(slug, (sessions, total_votes, votes_a, votes_b))| SlugQuestionTally {
                slug,
                sessions: sessions.len() as i64,
                total_votes,
                votes_a,
                votes_b,
            })
            .collect();
        tallies.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tallies)
    }

    async fn event_engagement(&self, event_id: &str) -> Result<EventTally, RepoError> {
        let question_ids = self.question_ids_for_event(event_id);
        let responses = self.responses.lock().unwrap();
        let mut sessions = HashSet::new();
        let mut total_votes = 0;
        for record in responses
            .values()
            .filter(|r| question_ids.contains(&r.question_id))
        {
            sessions.insert(record.session_id.clone());
            total_votes += 1;
        }
        Ok(EventTally {
            sessions: sessions.len() as i64,
            total_votes,
        })
    }

    async fn event_engagement_by_slug(
        &self,
        event_id: &str,
    ) -> Result<Vec<SlugEventTally>, RepoError> {
        let question_ids = self.question_ids_for_event(event_id);
        let responses = self.responses.lock().unwrap();
        let mut by_slug: HashMap<String, (HashSet<String>, i64)> = HashMap::new();
        for record in responses
            .values()
            .filter(|r| question_ids.contains(&r.question_id))
        {
            let entry = by_slug.entry(record.slug.clone()).or_default();
            entry.0.insert(record.session_id.clone());
            entry.1 += 1;
        }
        let mut tallies: Vec<_> = by_slug
            .into_iter()
            .map(|(slug, (sessions, total_votes))| SlugEventTally {
                slug,
                sessions: sessions.len() as i64,
                total_votes,
            })
            .collect();
        tallies.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tallies)
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Build the full router over an in-memory store, with fast retry backoff.
pub fn build_app(store: &Arc<InMemoryStore>) -> Router {
    let retry = RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    let event_data = Arc::new(EventDataCache::new(
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Duration::from_secs(3600),
        retry,
    ));
    let session_gate = Arc::new(SessionValidationCache::new(
        Arc::clone(store) as _,
        Duration::from_secs(300),
        retry,
    ));

    build_router(AppState {
        event_data,
        session_gate,
        events: Arc::clone(store) as _,
        questions: Arc::clone(store) as _,
        sessions: Arc::clone(store) as _,
        responses: Arc::clone(store) as _,
        health: Arc::clone(store) as _,
        retry,
        options: HttpOptions {
            base_url: "http://localhost:8080".to_string(),
            secure_cookie: false,
            cookie_max_age: Duration::from_secs(86_400),
            request_timeout: Duration::from_secs(10),
        },
    })
}

pub async fn get(router: &Router, path: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::empty()).expect("request");
    router.clone().oneshot(request).await.expect("response")
}

pub async fn post_form(
    router: &Router,
    path: &str,
    body: &str,
    cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::from(body.to_string())).expect("request");
    router.clone().oneshot(request).await.expect("response")
}

/// The `name=value` pair from a `Set-Cookie` header, if the response set one.
pub fn session_cookie_pair(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw.split(';').next().unwrap_or(raw).to_string())
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
