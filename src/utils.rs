//! Utility functions for text cleanup, link resolution, JSON recovery, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace normalization of scraped text
//! - Resolving relative hrefs against a source origin
//! - Pulling the first well-formed JSON value out of free-form LLM output
//! - String truncation for logging
//! - File system validation for output directories

use crate::error::{ExtractError, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*```[A-Za-z0-9_-]*\s*$").expect("valid regex"));

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_text("  COVID-19\n   Outbreak "), "COVID-19 Outbreak");
/// ```
pub fn clean_text(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Resolve an href found on a page of `origin` into an absolute URL.
///
/// Absolute hrefs are returned unchanged; `/path` and `path` forms are joined
/// onto the origin.
pub fn resolve_link(origin: &Url, href: &str) -> Result<String, ExtractError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(ExtractError::Empty("href"));
    }
    origin
        .join(href)
        .map(|u| u.to_string())
        .map_err(|source| ExtractError::BadLink {
            href: href.to_string(),
            source,
        })
}

/// Extract the first well-formed JSON array or object from free text.
///
/// Models wrap JSON in code fences, prose, or both. Fences are removed, then
/// every `[` / `{` is tried as a starting point until one parses. Trailing text
/// after the value is ignored.
///
/// # Errors
///
/// [`ValidationError::Truncated`] when the only candidate ran out of input
/// mid-value, [`ValidationError::NoJson`] otherwise.
pub fn extract_json(text: &str) -> Result<Value, ValidationError> {
    let cleaned = CODE_FENCE.replace_all(text, "");
    let mut truncated = None;

    for (start, c) in cleaned.char_indices() {
        if c != '[' && c != '{' {
            continue;
        }
        let mut values = serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) if looks_truncated(&e) => {
                truncated.get_or_insert(e);
            }
            _ => {}
        }
    }

    match truncated {
        Some(e) => Err(ValidationError::Truncated(e)),
        None => Err(ValidationError::NoJson {
            preview: truncate_for_log(text.trim(), 80),
        }),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (backing off to a char boundary)
/// with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
