//! Transient-fault classification and bounded retry with exponential backoff.
//!
//! Every store call on a hot request path goes through [`with_retry`] so the
//! backoff logic lives in exactly one place. Classification is a heuristic
//! over driver message text rather than a closed taxonomy: Postgres drivers
//! do not expose a stable machine-readable code for every recoverable
//! condition, so we match the handful of substrings that show up when the
//! infrastructure (not the query) is at fault.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::repos::RepoError;

/// Message fragments that indicate a recoverable infrastructure condition.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "timeout",
    "deadline exceeded",
    "too many connections",
    "connection pool exhausted",
    "could not serialize",
    "temporary failure",
];

/// Whether retrying `err` could plausibly succeed.
///
/// Not-found and input-shaped failures are never transient: retrying them
/// masks a real condition. Everything else is judged by case-insensitive
/// substring search over the error's rendered message; no match means fail
/// fast.
pub fn is_transient(err: &RepoError) -> bool {
    match err {
        RepoError::NotFound | RepoError::Duplicate { .. } | RepoError::InvalidInput { .. } => false,
        // Statement cancelled server-side; the next attempt gets a fresh budget.
        RepoError::Timeout => true,
        RepoError::Persistence(message) => {
            let message = message.to_lowercase();
            TRANSIENT_PATTERNS
                .iter()
                .any(|pattern| message.contains(pattern))
        }
    }
}

/// Retry behavior for one wrapped operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total invocation budget, including the first attempt. At least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
        }
    }
}

/// Serde mirror for the `[retry]` section of `pollcast.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: config.max_attempts,
            initial_backoff_ms: config.initial_backoff.as_millis() as u64,
            max_backoff_ms: config.max_backoff.as_millis() as u64,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    /// The operation failed with a classified-permanent error; it was not
    /// invoked again.
    #[error(transparent)]
    Aborted(RepoError),
    /// Every permitted attempt failed transiently; this is the last error.
    #[error("retries exhausted: {0}")]
    Exhausted(RepoError),
    /// The request's cancellation signal fired before the next attempt.
    #[error("operation cancelled")]
    Cancelled,
}

/// Run `op` with bounded retries and exponential backoff.
///
/// Invokes `op` at most `config.max_attempts` times. Permanent failures and
/// an already-cancelled token return immediately; the backoff sleep between
/// attempts races the cancellation signal, so an abandoned request stops
/// consuming its retry budget at the next suspension point. Backoff for
/// attempt `n` is `min(initial * 2^(n-1), max)`, bounding total sleep by
/// `(max_attempts - 1) * max_backoff`.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepoError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_transient(&err) {
            return Err(RetryError::Aborted(err));
        }

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted(err));
        }

        counter!("pollcast_db_retry_total").increment(1);

        tokio::select! {
            _ = tokio::time::sleep(backoff_for_attempt(config, attempt)) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }

        attempt += 1;
    }
}

fn backoff_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    config
        .initial_backoff
        .saturating_mul(1_u32 << exponent)
        .min(config.max_backoff)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn refused() -> RepoError {
        RepoError::Persistence("connection refused".into())
    }

    #[test]
    fn classifier_matches_known_transient_messages() {
        assert!(is_transient(&RepoError::Persistence(
            "dial tcp 10.0.0.3:5432: connection refused".into()
        )));
        assert!(is_transient(&RepoError::Persistence(
            "FATAL: too many connections for role \"pollcast\"".into()
        )));
        assert!(is_transient(&RepoError::Persistence(
            "Connection Reset by peer".into()
        )));
        assert!(is_transient(&RepoError::Timeout));
    }

    #[test]
    fn classifier_rejects_permanent_errors() {
        assert!(!is_transient(&RepoError::NotFound));
        assert!(!is_transient(&RepoError::Duplicate {
            constraint: "responses_pkey".into()
        }));
        assert!(!is_transient(&RepoError::InvalidInput {
            message: "invalid choice value".into()
        }));
        assert!(!is_transient(&RepoError::Persistence(
            "column \"nope\" does not exist".into()
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 3,
            ..Default::default()
        };

        let result = with_retry(&cancel, &config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err(refused()) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 4,
            ..Default::default()
        };

        let result: Result<(), _> = with_retry(&cancel, &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(refused()) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn never_retries_a_not_found() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 5,
            ..Default::default()
        };

        let result: Result<(), _> = with_retry(&cancel, &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RepoError::NotFound) }
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Aborted(RepoError::NotFound))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_first_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig::default();

        let result = with_retry(&cancel, &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(41) }
        })
        .await;

        assert_eq!(result.unwrap(), 41);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_further_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 5,
            ..Default::default()
        };

        let result: Result<(), _> = with_retry(&cancel, &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            // Simulates the request giving up while the call is in flight.
            cancel.cancel();
            async { Err(refused()) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(backoff_for_attempt(&config, 1), Duration::from_millis(50));
        assert_eq!(backoff_for_attempt(&config, 2), Duration::from_millis(100));
        assert_eq!(backoff_for_attempt(&config, 3), Duration::from_millis(200));
        assert_eq!(backoff_for_attempt(&config, 4), Duration::from_millis(400));
        assert_eq!(backoff_for_attempt(&config, 5), Duration::from_millis(500));
        assert_eq!(backoff_for_attempt(&config, 9), Duration::from_millis(500));
    }
}
