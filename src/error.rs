//! Error taxonomy for the crawl and refresh pipelines.
//!
//! Crawl-side errors ([`FetchError`], [`ExtractError`]) are recovered where
//! they happen: the crawl logs them and carries on with a gap. Refresh-side
//! errors ([`ValidationError`], [`BackendError`]) drive the primary to
//! fallback escalation, and [`PersistError`] / [`ConfigError`] always reach
//! the caller.

use serde::Serialize;
use std::path::PathBuf;

/// A page could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// An expected DOM element was missing. Always recovered by skipping the item.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("missing element: {0}")]
    MissingElement(&'static str),

    #[error("empty {0}")]
    Empty(&'static str),

    #[error("unresolvable link {href:?}: {source}")]
    BadLink {
        href: String,
        source: url::ParseError,
    },
}

/// Backend text could not be turned into the expected structured shape.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no JSON value found in response (starts with {preview:?})")]
    NoJson { preview: String },

    #[error("response JSON is truncated: {0}")]
    Truncated(serde_json::Error),

    #[error("expected a JSON array, found {found}")]
    NotAnArray { found: &'static str },

    #[error("item does not match the {category} schema: {source}")]
    Schema {
        category: &'static str,
        source: serde_json::Error,
    },
}

/// Writing to or reading from durable storage failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("persisted dataset {path} is not a JSON array: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// No usable configuration or credential.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no backend credential configured (set {0})")]
    MissingCredential(&'static str),

    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The generative backend did not produce text.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("backend response has no text: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Whether trying the same backend again may help.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::MalformedResponse(_) => false,
        }
    }
}

/// Why a single backend attempt in a refresh cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Terminal failure of a refresh or question-answering cycle.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("{}", exhausted_message(.primary, .fallback.as_ref()))]
    BackendsExhausted {
        primary: AttemptError,
        fallback: Option<AttemptError>,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn exhausted_message(primary: &AttemptError, fallback: Option<&AttemptError>) -> String {
    match fallback {
        Some(fallback) => format!("primary backend failed ({primary}); fallback backend failed ({fallback})"),
        None => format!("primary backend failed ({primary}); no fallback backend configured"),
    }
}

/// Structured failure handed back to callers.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl From<&RefreshError> for ErrorPayload {
    fn from(err: &RefreshError) -> Self {
        match err {
            RefreshError::BackendsExhausted { primary, fallback } => {
                let mut causes = vec![format!("primary: {primary}")];
                causes.push(match fallback {
                    Some(f) => format!("fallback: {f}"),
                    None => "fallback: not configured".to_string(),
                });
                ErrorPayload {
                    kind: attempt_kind(primary),
                    error: err.to_string(),
                    causes,
                }
            }
            RefreshError::Persist(e) => ErrorPayload {
                kind: "persist",
                error: e.to_string(),
                causes: Vec::new(),
            },
            RefreshError::Config(e) => ErrorPayload {
                kind: "config",
                error: e.to_string(),
                causes: Vec::new(),
            },
        }
    }
}

fn attempt_kind(err: &AttemptError) -> &'static str {
    match err {
        AttemptError::Backend(_) => "backend",
        AttemptError::Validation(_) => "validation",
    }
}
