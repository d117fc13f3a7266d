//! Named dataset files, one JSON array per [`Category`].

use crate::error::PersistError;
use crate::models::Category;
use crate::outputs::json::write_json_atomic;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct DatasetStore {
    dir: PathBuf,
}

impl DatasetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, category: Category) -> PathBuf {
        self.dir.join(format!("{}.json", category.as_str()))
    }

    /// Items last persisted for `category`. A dataset that was never
    /// written is empty.
    #[instrument(level = "debug", skip(self))]
    pub async fn load(&self, category: Category) -> Result<Vec<Value>, PersistError> {
        let path = self.path(category);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Dataset not yet populated");
                return Ok(Vec::new());
            }
            Err(source) => return Err(PersistError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Corrupt { path, source })
    }

    /// Replace the dataset for `category` with `items`.
    #[instrument(level = "info", skip(self, items), fields(count = items.len()))]
    pub async fn save(&self, category: Category, items: &[Value]) -> Result<(), PersistError> {
        write_json_atomic(items, &self.path(category)).await
    }
}
