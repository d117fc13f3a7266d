//! Generative backend interaction with exponential backoff retry logic.
//!
//! This module talks to the Gemini `generateContent` REST endpoint. It
//! includes automatic retry logic with exponential backoff and jitter for
//! transient failures, and a primary/fallback pair of configured backends.
//!
//! # Architecture
//!
//! - [`Generate`]: Core trait defining async prompt-in/text-out interaction
//! - [`GeminiBackend`]: HTTP implementation over `reqwest`
//! - [`RetryGenerate`]: Decorator that adds retry logic to any `Generate` implementation
//! - [`Backends`]: The primary backend and an optional fallback
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, HTTP 429, HTTP 5xx)
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::{BackendError, ConfigError};
use rand::{Rng, rng};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Trait for async text generation.
///
/// Implementors send a prompt to a generative model and return its text
/// answer. `grounded` asks the backend to consult live web search.
pub trait Generate {
    async fn generate(&self, prompt: &str, grounded: bool) -> Result<String, BackendError>;
}

/// Gemini `generateContent` client bound to one API key.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }
}

fn request_body(prompt: &str, grounded: bool) -> Value {
    let mut body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
    if grounded {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

/// Concatenated text parts of the first candidate.
fn response_text(envelope: &Value) -> Result<String, BackendError> {
    let parts = envelope
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::MalformedResponse("no candidates[0].content.parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        return Err(BackendError::MalformedResponse("candidate has no text".into()));
    }
    Ok(text)
}

impl Generate for GeminiBackend {
    #[instrument(level = "info", skip_all, fields(model = %self.model, grounded = grounded))]
    async fn generate(&self, prompt: &str, grounded: bool) -> Result<String, BackendError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .json(&request_body(prompt, grounded))
            .send()
            .await
            // reqwest errors carry the URL, which carries the key.
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "Backend returned error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: crate::utils::truncate_for_log(&body, 300),
            });
        }

        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.without_url().to_string()))?;
        let text = response_text(&envelope)?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = text.len(),
            "Backend answered"
        );
        Ok(text)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Generate`] implementation.
///
/// Non-transient failures (4xx other than 429, malformed envelopes) are
/// returned immediately.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryGenerate<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryGenerate<T>
where
    T: Generate,
{
    /// Wrap `inner`, retrying up to `max_retries` times after the first attempt.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryGenerate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerate")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Generate for RetryGenerate<T>
where
    T: Generate,
{
    #[instrument(level = "info", skip_all)]
    async fn generate(&self, prompt: &str, grounded: bool) -> Result<String, BackendError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(prompt, grounded).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() {
                        warn!(attempt, error = %e, "generate() failed permanently");
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "generate() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let shift = (attempt - 1).min(16) as u32;
                    let delay = self
                        .base_delay
                        .saturating_mul(1u32 << shift)
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Which configured backend produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Fallback,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Primary => "primary",
            Role::Fallback => "fallback",
        })
    }
}

/// The primary backend and, when configured, a fallback.
#[derive(Debug)]
pub struct Backends<B> {
    pub primary: B,
    pub fallback: Option<B>,
}

/// Settings for building the Gemini backend pair.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub fallback_api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: StdDuration,
    pub max_retries: usize,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            fallback_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: StdDuration::from_secs(60),
            max_retries: 3,
        }
    }
}

fn non_blank(key: Option<&String>) -> Option<&str> {
    key.map(|k| k.trim()).filter(|k| !k.is_empty())
}

impl Backends<RetryGenerate<GeminiBackend>> {
    /// Build the backend pair. A missing primary key is a configuration
    /// error; a missing fallback key just means no fallback.
    pub fn gemini(settings: &GeminiSettings) -> Result<Self, ConfigError> {
        let primary_key = non_blank(settings.api_key.as_ref())
            .ok_or(ConfigError::MissingCredential("GEMINI_API_KEY"))?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        let wrap = |key: &str| {
            RetryGenerate::new(
                GeminiBackend::new(client.clone(), key, settings.model.clone())
                    .with_base_url(settings.base_url.clone()),
                settings.max_retries,
                StdDuration::from_secs(1),
            )
        };

        let fallback = non_blank(settings.fallback_api_key.as_ref()).map(wrap);
        info!(
            model = %settings.model,
            fallback = fallback.is_some(),
            "Configured generative backends"
        );
        Ok(Self {
            primary: wrap(primary_key),
            fallback,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays a fixed script of replies, one per call.
    #[derive(Debug)]
    pub struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, BackendError>>>,
        prompts: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<String, BackendError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn failing(status: u16) -> Self {
            Self::new(vec![Err(BackendError::Status {
                status,
                body: "nope".into(),
            })])
        }

        pub fn prompts(&self) -> Vec<(String, bool)> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl Generate for ScriptedBackend {
        async fn generate(&self, prompt: &str, grounded: bool) -> Result<String, BackendError> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), grounded));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;
    use crate::fetcher::testing::{closed_url, http_response, serve_once};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body_grounding() {
        assert_eq!(
            request_body("hi", false),
            json!({ "contents": [{ "parts": [{ "text": "hi" }] }] })
        );
        assert_eq!(
            request_body("hi", true)["tools"],
            json!([{ "google_search": {} }])
        );
    }

    #[test]
    fn test_response_text() {
        let envelope = json!({
            "candidates": [{ "content": { "parts": [{ "text": "[1," }, { "text": "2]" }] } }]
        });
        assert_eq!(response_text(&envelope).unwrap(), "[1,2]");

        let empty = json!({ "candidates": [] });
        assert!(matches!(
            response_text(&empty),
            Err(BackendError::MalformedResponse(_))
        ));
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(response_text(&blank).is_err());
    }

    #[test]
    fn test_endpoint_encodes_key() {
        let backend = GeminiBackend::new(reqwest::Client::new(), "a/b c", "gemini-x")
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            backend.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-x:generateContent?key=a%2Fb%20c"
        );
        assert!(!format!("{backend:?}").contains("a/b c"));
    }

    #[test]
    fn test_missing_primary_key_is_config_error() {
        let settings = GeminiSettings {
            api_key: Some("   ".into()),
            fallback_api_key: Some("fb".into()),
            ..Default::default()
        };
        assert!(matches!(
            Backends::gemini(&settings),
            Err(ConfigError::MissingCredential("GEMINI_API_KEY"))
        ));
    }

    #[test]
    fn test_fallback_is_optional() {
        let settings = GeminiSettings {
            api_key: Some("k".into()),
            ..Default::default()
        };
        let backends = Backends::gemini(&settings).unwrap();
        assert!(backends.fallback.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_errors() {
        let inner = ScriptedBackend::new(vec![
            Err(BackendError::Transport("reset".into())),
            Err(BackendError::Status { status: 503, body: String::new() }),
            Ok("done".into()),
        ]);
        let retry = RetryGenerate::new(inner, 5, StdDuration::from_secs(1));
        assert_eq!(retry.generate("p", false).await.unwrap(), "done");
        assert_eq!(retry.inner.prompts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max() {
        let inner = ScriptedBackend::new(vec![
            Err(BackendError::Status { status: 429, body: String::new() }),
            Err(BackendError::Status { status: 429, body: String::new() }),
            Err(BackendError::Status { status: 429, body: String::new() }),
        ]);
        let retry = RetryGenerate::new(inner, 2, StdDuration::from_millis(10));
        let err = retry.generate("p", false).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 429, .. }));
        assert_eq!(retry.inner.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let retry = RetryGenerate::new(ScriptedBackend::failing(400), 5, StdDuration::from_secs(1));
        assert!(retry.generate("p", true).await.is_err());
        assert_eq!(retry.inner.prompts(), vec![("p".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = GeminiBackend::new(reqwest::Client::new(), "k", "m")
            .with_base_url(closed_url().await);
        let err = backend.generate("p", false).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(err.is_transient());
        assert!(!err.to_string().contains("key=k"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_body() {
        let base = serve_once(http_response(
            "503 Service Unavailable",
            "application/json",
            r#"{"error":"overloaded"}"#,
        ))
        .await;
        let backend = GeminiBackend::new(reqwest::Client::new(), "k", "m").with_base_url(base);

        let err = backend.generate("p", false).await.unwrap_err();
        match &err {
            BackendError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert!(body.contains("overloaded"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_candidate_text_is_returned() {
        let envelope = json!({
            "candidates": [{ "content": { "parts": [{ "text": "[]" }] } }]
        })
        .to_string();
        let base = serve_once(http_response("200 OK", "application/json", &envelope)).await;
        let backend = GeminiBackend::new(reqwest::Client::new(), "k", "m").with_base_url(base);

        assert_eq!(backend.generate("p", true).await.unwrap(), "[]");
    }
}
