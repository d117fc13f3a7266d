//! Page fetching.
//!
//! [`Fetch`] is the single capability every extractor and the detail enricher
//! go through. [`HttpFetcher`] wraps one pooled `reqwest::Client`; with the
//! `headless` feature, [`HeadlessFetcher`] renders a page in one headless
//! Chrome session for the news-headline crawl.

use crate::config::CrawlConfig;
use crate::error::{ConfigError, FetchError};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Retrieve the HTML body of a page.
pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Plain HTTP GET with a fixed timeout. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self, ConfigError> {
        Self::new(&config.user_agent, config.request_timeout())
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Non-success status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Renders a page in headless Chrome, waits for `wait_for` to appear, scrolls
/// to the bottom and lets late content settle before snapshotting the DOM.
#[cfg(feature = "headless")]
#[derive(Debug, Clone)]
pub struct HeadlessFetcher {
    pub wait_for: String,
    pub settle: Duration,
}

#[cfg(feature = "headless")]
impl Default for HeadlessFetcher {
    fn default() -> Self {
        Self {
            wait_for: "article".to_string(),
            settle: Duration::from_secs(2),
        }
    }
}

#[cfg(feature = "headless")]
impl HeadlessFetcher {
    fn render(&self, url: &str) -> Result<String, String> {
        use headless_chrome::{Browser, LaunchOptions};

        let browser = Browser::new(LaunchOptions {
            headless: true,
            sandbox: false,
            ..Default::default()
        })
        .map_err(|e| e.to_string())?;
        let tab = browser.new_tab().map_err(|e| e.to_string())?;
        tab.navigate_to(url).map_err(|e| e.to_string())?;
        tab.wait_for_element(&self.wait_for)
            .map_err(|e| e.to_string())?;
        tab.evaluate("window.scrollTo(0, document.body.scrollHeight);", false)
            .map_err(|e| e.to_string())?;
        std::thread::sleep(self.settle);
        tab.get_content().map_err(|e| e.to_string())
    }
}

#[cfg(feature = "headless")]
impl Fetch for HeadlessFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let this = self.clone();
        let target = url.to_string();
        let rendered = tokio::task::spawn_blocking(move || this.render(&target))
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        rendered.map_err(|message| FetchError::Transport {
            url: url.to_string(),
            message,
        })
    }
}
