//! Refresh cycle for the named datasets.
//!
//! ```text
//! primary.generate ──ok──▶ validate ──ok──▶ persist ──▶ done
//!        │                    │
//!        └──────err───────────┴──▶ fallback.generate ─▶ validate ─▶ persist
//!                                        │                 │
//!                                        └──────err────────┴──▶ BackendsExhausted
//! ```
//!
//! Nothing is written until a response has validated, so a malformed answer
//! never replaces the previous dataset.

use crate::api::{Backends, Generate, Role};
use crate::error::{AttemptError, RefreshError, ValidationError};
use crate::models::{Category, Disease, Medication, OutbreakStory};
use crate::store::DatasetStore;
use crate::utils::extract_json;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

/// A successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub category: Category,
    pub served_by: Role,
    pub items: Vec<Value>,
}

impl RefreshOutcome {
    /// `{"top_<category>": [...]}`
    pub fn to_response(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.category.response_key(), Value::Array(self.items.clone()));
        Value::Object(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn conform<T>(category: Category, items: Vec<Value>) -> Result<Vec<Value>, ValidationError>
where
    T: DeserializeOwned + Serialize,
{
    let schema = |source| ValidationError::Schema {
        category: category.as_str(),
        source,
    };
    items
        .into_iter()
        .map(|item| {
            let typed: T = serde_json::from_value(item).map_err(schema)?;
            serde_json::to_value(typed).map_err(schema)
        })
        .collect()
}

/// Parse backend text into the list of items for `category`.
///
/// The first JSON value in the text must be an array whose every element
/// matches the category's schema. Items are returned in normalized form.
pub fn validate(category: Category, text: &str) -> Result<Vec<Value>, ValidationError> {
    let items = match extract_json(text)? {
        Value::Array(items) => items,
        other => {
            return Err(ValidationError::NotAnArray {
                found: json_kind(&other),
            });
        }
    };
    match category {
        Category::Diseases => conform::<Disease>(category, items),
        Category::Outbreaks => conform::<OutbreakStory>(category, items),
        Category::Meds => conform::<Medication>(category, items),
    }
}

async fn attempt<B, T, V>(
    backend: &B,
    prompt: &str,
    grounded: bool,
    accept: &V,
) -> Result<T, AttemptError>
where
    B: Generate,
    V: Fn(&str) -> Result<T, ValidationError>,
{
    let text = backend.generate(prompt, grounded).await?;
    Ok(accept(&text)?)
}

/// Ask the primary backend, then the fallback if the primary's answer could
/// not be obtained or accepted.
pub(crate) async fn with_fallback<B, T, V>(
    backends: &Backends<B>,
    prompt: &str,
    grounded: bool,
    accept: V,
) -> Result<(Role, T), RefreshError>
where
    B: Generate,
    V: Fn(&str) -> Result<T, ValidationError>,
{
    let primary = match attempt(&backends.primary, prompt, grounded, &accept).await {
        Ok(value) => return Ok((Role::Primary, value)),
        Err(e) => {
            warn!(error = %e, "Primary backend failed");
            e
        }
    };

    let Some(fallback) = &backends.fallback else {
        return Err(RefreshError::BackendsExhausted {
            primary,
            fallback: None,
        });
    };

    match attempt(fallback, prompt, grounded, &accept).await {
        Ok(value) => Ok((Role::Fallback, value)),
        Err(e) => {
            warn!(error = %e, "Fallback backend failed");
            Err(RefreshError::BackendsExhausted {
                primary,
                fallback: Some(e),
            })
        }
    }
}

/// Run one refresh cycle for `category` and persist the validated result.
#[instrument(level = "info", skip(backends, store))]
pub async fn refresh<B: Generate>(
    backends: &Backends<B>,
    store: &DatasetStore,
    category: Category,
) -> Result<RefreshOutcome, RefreshError> {
    let (served_by, items) = with_fallback(
        backends,
        category.prompt(),
        category.wants_search_grounding(),
        |text| validate(category, text),
    )
    .await?;

    store.save(category, &items).await?;
    info!(%served_by, count = items.len(), "Dataset refreshed");

    Ok(RefreshOutcome {
        category,
        served_by,
        items,
    })
}
