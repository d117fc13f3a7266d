//! Question answering over the persisted datasets.
//!
//! All three datasets are loaded and handed to the backend verbatim as the
//! grounding context. There is no summarization or truncation.

use crate::api::{Backends, Generate};
use crate::error::{PersistError, RefreshError};
use crate::models::Category;
use crate::refresh::with_fallback;
use crate::store::DatasetStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub diseases: Vec<Value>,
    pub outbreaks: Vec<Value>,
    pub meds: Vec<Value>,
}

impl ChatContext {
    #[instrument(level = "info", skip_all, fields(dir = %store.dir().display()))]
    pub async fn load(store: &DatasetStore) -> Result<Self, PersistError> {
        let context = Self {
            diseases: store.load(Category::Diseases).await?,
            outbreaks: store.load(Category::Outbreaks).await?,
            meds: store.load(Category::Meds).await?,
        };
        info!(
            diseases = context.diseases.len(),
            outbreaks = context.outbreaks.len(),
            meds = context.meds.len(),
            "Loaded chat context"
        );
        Ok(context)
    }

    pub fn to_context_string(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build_prompt(&self, question: &str) -> Result<String, PersistError> {
        Ok(format!(
            "You are a public health assistant. Answer the user's question using the \
             outbreak intelligence data below. If the data does not cover the question, \
             say so plainly.\n\nDATA:\n{}\n\nQUESTION: {}",
            self.to_context_string()?,
            question.trim()
        ))
    }
}

/// Answer `question` from the current datasets, falling back to the
/// secondary backend when the primary fails.
#[instrument(level = "info", skip_all)]
pub async fn answer<B: Generate>(
    backends: &Backends<B>,
    store: &DatasetStore,
    question: &str,
) -> Result<String, RefreshError> {
    let prompt = ChatContext::load(store).await?.build_prompt(question)?;
    let (served_by, text) =
        with_fallback(backends, &prompt, false, |text| Ok(text.trim().to_string())).await?;
    info!(%served_by, chars = text.len(), "Answered question");
    Ok(text)
}
