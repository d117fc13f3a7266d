//! Per-site extractors for outbreak and travel-notice sources.
//!
//! Each source publishes its listing in a different DOM shape, so each gets
//! its own [`SiteExtractor`] implementation. The crawl pipeline only sees the
//! trait; which implementations run, and in which order, is decided by the
//! [`ExtractorKind`] list in the crawl config.
//!
//! # Supported Sources
//!
//! | Source | Module | Listing shape | Paginated |
//! |--------|--------|---------------|-----------|
//! | CDC outbreaks | [`cdc_outbreaks`] | `<h2>` heading + following `<table>` | no |
//! | CDC travel notices | [`cdc_travel`] | `<h3>` level + following `<ul>` | no |
//! | WHO Disease Outbreak News | [`who_dons`] | `article.teaser` cards | `?page=N` |
//!
//! The [`news`] module is separate: it turns the Google News health topic page
//! into CSV headline rows and takes no part in the outbreak dataset.
//!
//! # Common Patterns
//!
//! - Missing sub-elements skip the affected item, never the page
//! - Relative hrefs are resolved against the source origin
//! - Titles and headings are whitespace-normalized with [`clean_text`]; table cells are only trimmed

pub mod cdc_outbreaks;
pub mod cdc_travel;
pub mod news;
pub mod who_dons;

use crate::models::{RawRecord, Source};
use crate::utils::clean_text;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

pub use cdc_outbreaks::CdcOutbreakExtractor;
pub use cdc_travel::CdcTravelExtractor;
pub use who_dons::WhoDonExtractor;

/// What one listing page yielded.
#[derive(Debug, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<RawRecord>,
    /// The next listing page to visit, if the source paginates and has more.
    pub next_page: Option<Url>,
}

/// Turns one source's listing pages into records.
pub trait SiteExtractor: Send + Sync {
    fn source(&self) -> Source;

    /// The first listing page.
    fn first_page(&self) -> Url;

    /// Extract the records on `page_url`, whose body is `html`.
    fn extract(&self, html: &str, page_url: &Url) -> Extraction;

    /// Containers holding the body text on a detail page, in preference order.
    fn content_selectors(&self) -> &[Selector];
}

/// Configured choice of extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    CdcOutbreaks,
    CdcTravelNotices,
    WhoDons,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 3] = [
        ExtractorKind::CdcOutbreaks,
        ExtractorKind::CdcTravelNotices,
        ExtractorKind::WhoDons,
    ];

    pub fn build(self) -> Box<dyn SiteExtractor> {
        match self {
            ExtractorKind::CdcOutbreaks => Box::new(CdcOutbreakExtractor::default()),
            ExtractorKind::CdcTravelNotices => Box::new(CdcTravelExtractor::default()),
            ExtractorKind::WhoDons => Box::new(WhoDonExtractor::default()),
        }
    }
}

/// Normalized text content of an element.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<String>())
}

/// Pair each kept heading with the first block element after it in document order.
///
/// `combined` must match both headings and blocks. Elements matching `heading`
/// are headings; those rejected by `keep` are passed over entirely, so a kept
/// heading still reaches the block behind an ignored one. Consecutive kept
/// headings all share the next block, and trailing headings are dropped.
pub(crate) fn pair_headings_with_blocks<'a>(
    doc: &'a Html,
    combined: &Selector,
    heading: &Selector,
    keep: impl Fn(ElementRef<'a>) -> bool,
) -> Vec<(ElementRef<'a>, ElementRef<'a>)> {
    let mut pending: Vec<ElementRef<'a>> = Vec::new();
    let mut pairs = Vec::new();

    for el in doc.select(combined) {
        if heading.matches(&el) {
            if keep(el) {
                pending.push(el);
            }
        } else if !pending.is_empty() {
            pairs.extend(pending.drain(..).map(|h| (h, el)));
        }
    }
    pairs
}

/// Join the text of every paragraph inside the first matching content container.
///
/// Returns `None` when no container matches or it holds no paragraph text.
pub fn extract_full_text(html: &str, containers: &[Selector]) -> Option<String> {
    static P: once_cell::sync::Lazy<Selector> =
        once_cell::sync::Lazy::new(|| Selector::parse("p").expect("valid selector"));

    let doc = Html::parse_document(html);
    let container = containers.iter().find_map(|sel| doc.select(sel).next())?;
    let text = container
        .select(&P)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .join("\n");

    if text.trim().is_empty() { None } else { Some(text) }
}
