//! # outbreak_intel
//!
//! An outbreak-intelligence aggregator. It crawls public-health listing pages
//! (CDC outbreak tables, CDC travel health notices, WHO Disease Outbreak
//! News), enriches each record with the text of its detail page, and writes
//! one combined JSON dataset per run. Separately, it keeps three small named
//! datasets (diseases, outbreaks, meds) refreshed from a generative backend
//! and answers questions over them.
//!
//! ## Usage
//!
//! ```sh
//! outbreak_intel crawl -o ./out
//! outbreak_intel news -o ./out
//! outbreak_intel refresh diseases
//! outbreak_intel ask "What is spreading in West Africa?"
//! ```
//!
//! ## Architecture
//!
//! 1. **Crawling**: one task per source paginates its listing, rate-limited
//! 2. **Enrichment**: each linked record's detail page is fetched for its full text
//! 3. **Aggregation**: batches arrive over a channel and are merged in source order
//! 4. **Refresh**: primary backend, then fallback, validated before anything is persisted
//!
//! Logs go to stderr; `refresh` and `ask` print their JSON result to stdout.

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod context;
mod crawl;
mod error;
mod fetcher;
mod models;
mod outputs;
mod rate_limit;
mod refresh;
mod scrapers;
mod store;
mod utils;

use api::{Backends, GeminiSettings};
use cli::{Cli, Command};
use error::{ErrorPayload, RefreshError};
use fetcher::HttpFetcher;
use models::Category;
use store::DatasetStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.command, data_dir = %args.data_dir.display(), "Parsed CLI arguments");

    let result = match &args.command {
        Command::Crawl { output_dir } => crawl_command(&args, output_dir).await,
        Command::News { output_dir } => news_command(&args, output_dir).await,
        Command::Refresh { category } => refresh_command(&args, *category).await,
        Command::Ask { question } => ask_command(&args, question).await,
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        ok = result.is_ok(),
        "Execution complete"
    );
    result
}

async fn prepare_output_dir(output_dir: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    Ok(())
}

async fn crawl_command(args: &Cli, output_dir: &Path) -> Result<(), Box<dyn Error>> {
    prepare_output_dir(output_dir).await?;
    let config = config::load_config(args.config.as_deref())?;
    let fetcher = HttpFetcher::from_config(&config)?;

    let records = crawl::run_crawl(&config, fetcher).await;
    let path = outputs::json::write_crawl_dataset(&records, output_dir).await?;
    info!(path = %path.display(), count = records.len(), "Wrote crawl dataset");
    Ok(())
}

async fn news_command(args: &Cli, output_dir: &Path) -> Result<(), Box<dyn Error>> {
    prepare_output_dir(output_dir).await?;
    let config = config::load_config(args.config.as_deref())?;

    #[cfg(feature = "headless")]
    let fetcher = fetcher::HeadlessFetcher::default();
    #[cfg(not(feature = "headless"))]
    let fetcher = HttpFetcher::from_config(&config)?;

    let headlines = scrapers::news::crawl_headlines(&fetcher, &config.news_url).await?;
    if headlines.is_empty() {
        warn!(url = %config.news_url, "No headlines found; nothing written");
        return Ok(());
    }
    let path = outputs::csv::write_headlines(&headlines, output_dir).await?;
    info!(path = %path.display(), count = headlines.len(), "Wrote news headlines");
    Ok(())
}

fn gemini_settings(args: &Cli) -> GeminiSettings {
    GeminiSettings {
        api_key: args.gemini_api_key.clone(),
        fallback_api_key: args.gemini_fallback_api_key.clone(),
        model: args.gemini_model.clone(),
        ..Default::default()
    }
}

/// Print the JSON result on success, or the structured error payload on failure.
fn report<T: Serialize>(result: Result<T, RefreshError>) -> Result<(), Box<dyn Error>> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Request failed");
            println!("{}", serde_json::to_string_pretty(&ErrorPayload::from(&e))?);
            Err(e.into())
        }
    }
}

async fn refresh_command(args: &Cli, category: Category) -> Result<(), Box<dyn Error>> {
    let store = DatasetStore::new(&args.data_dir);
    let result = match Backends::gemini(&gemini_settings(args)) {
        Ok(backends) => refresh::refresh(&backends, &store, category)
            .await
            .map(|outcome| outcome.to_response()),
        Err(e) => Err(e.into()),
    };
    report(result)
}

async fn ask_command(args: &Cli, question: &str) -> Result<(), Box<dyn Error>> {
    let store = DatasetStore::new(&args.data_dir);
    let result = match Backends::gemini(&gemini_settings(args)) {
        Ok(backends) => context::answer(&backends, &store, question)
            .await
            .map(|answer| serde_json::json!({ "answer": answer })),
        Err(e) => Err(e.into()),
    };
    report(result)
}
