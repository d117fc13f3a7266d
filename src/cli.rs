//! Command-line interface definitions for outbreak_intel.
//!
//! All credentials can be provided via command-line flags or environment
//! variables.

use crate::models::Category;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the outbreak_intel application.
///
/// # Examples
///
/// ```sh
/// # Crawl CDC and WHO listings into ./out/all_outbreaks.json
/// outbreak_intel crawl -o ./out
///
/// # Refresh the outbreaks dataset, falling back to a second key
/// GEMINI_API_KEY=... GEMINI_FALLBACK_API_KEY=... outbreak_intel refresh outbreaks
///
/// # Ask a question over the persisted datasets
/// outbreak_intel ask "Which diseases are spreading in South America?"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a crawl config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the named datasets (diseases, outbreaks, meds)
    #[arg(long, global = true, env = "OUTBREAK_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Primary Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Fallback Gemini API key, used when the primary fails
    #[arg(long, env = "GEMINI_FALLBACK_API_KEY", hide_env_values = true)]
    pub gemini_fallback_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL_NAME", default_value = crate::api::DEFAULT_MODEL)]
    pub gemini_model: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Crawl CDC outbreaks, CDC travel notices and WHO outbreak news
    Crawl {
        /// Output directory for all_outbreaks.json
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Crawl health headlines from Google News into a CSV file
    News {
        /// Output directory for google_health_news.csv
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Regenerate one named dataset from the generative backend
    Refresh {
        #[arg(value_enum)]
        category: Category,
    },
    /// Answer a question using the persisted datasets as context
    Ask { question: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_crawl_parsing() {
        let cli = Cli::parse_from(["outbreak_intel", "crawl", "--output-dir", "./out"]);
        assert_eq!(
            cli.command,
            Command::Crawl {
                output_dir: PathBuf::from("./out")
            }
        );
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_cli_short_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "outbreak_intel",
            "news",
            "-o",
            "/tmp/news",
            "-c",
            "crawl.yaml",
            "--data-dir",
            "/tmp/data",
        ]);

        assert_eq!(
            cli.command,
            Command::News {
                output_dir: PathBuf::from("/tmp/news")
            }
        );
        assert_eq!(cli.config, Some(PathBuf::from("crawl.yaml")));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/data"));
    }

    #[test]
    fn test_cli_refresh_and_ask() {
        let cli = Cli::parse_from([
            "outbreak_intel",
            "--gemini-api-key",
            "k1",
            "refresh",
            "meds",
        ]);
        assert_eq!(
            cli.command,
            Command::Refresh {
                category: Category::Meds
            }
        );
        assert_eq!(cli.gemini_api_key.as_deref(), Some("k1"));

        let cli = Cli::parse_from(["outbreak_intel", "ask", "Is mpox spreading?"]);
        assert_eq!(
            cli.command,
            Command::Ask {
                question: "Is mpox spreading?".into()
            }
        );
    }

    #[test]
    fn test_cli_rejects_unknown_category() {
        assert!(Cli::try_parse_from(["outbreak_intel", "refresh", "vaccines"]).is_err());
    }
}
