//! Crawl configuration.
//!
//! Every field has a default, so the config file is optional. When a path is
//! given it must exist and parse; a broken file is a [`ConfigError`], never a
//! silent fallback to defaults.
//!
//! ```yaml
//! request_timeout_secs: 10
//! rate_limit_ms: 1000
//! max_pages: 1000
//! sources: [cdc_outbreaks, cdc_travel_notices, who_dons]
//! ```

use crate::error::ConfigError;
use crate::scrapers::ExtractorKind;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_NEWS_URL: &str = "https://news.google.com/topics/CAAqJQgKIh9DQkFTRVFvSUwyMHZNR3QwTlRFU0JXVnVMVWRDS0FBUAE?hl=en-IN&gl=IN&ceid=IN%3Aen";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlConfig {
    /// Per-request network timeout.
    pub request_timeout_secs: u64,
    /// Minimum gap between two requests issued by the same source task.
    pub rate_limit_ms: u64,
    /// Hard ceiling on listing pages per source.
    pub max_pages: usize,
    pub user_agent: String,
    /// Sources to crawl, in the order their records appear in the dataset.
    pub sources: Vec<ExtractorKind>,
    pub news_url: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            rate_limit_ms: 1000,
            max_pages: 1000,
            user_agent: concat!("outbreak_intel/", env!("CARGO_PKG_VERSION")).to_string(),
            sources: ExtractorKind::ALL.to_vec(),
            news_url: DEFAULT_NEWS_URL.to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// Load the crawl config from `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub fn load_config(path: Option<&Path>) -> Result<CrawlConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(CrawlConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: CrawlConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(sources = ?config.sources, max_pages = config.max_pages, "Loaded crawl config");
    Ok(config)
}
