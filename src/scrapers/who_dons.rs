//! WHO Disease Outbreak News.
//!
//! The listing at `https://www.who.int/emergencies/disease-outbreak-news` shows
//! `article.teaser` cards and paginates with a `?page=N` query parameter. The
//! first page is the bare URL. A page with no teaser cards is the end of the
//! listing.

use super::{Extraction, SiteExtractor, text_of};
use crate::error::ExtractError;
use crate::models::{RawRecord, Source};
use crate::utils::resolve_link;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

const E: &str = "Invalid selector";
static TEASER: Lazy<Selector> = Lazy::new(|| Selector::parse("article.teaser").expect(E));
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.teaser__title a").expect(E));
static TIMESTAMP: Lazy<Selector> = Lazy::new(|| Selector::parse("span.timestamp").expect(E));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("p.teaser__body").expect(E));

#[derive(Debug)]
pub struct WhoDonExtractor {
    origin: Url,
    listing: Url,
    content: Vec<Selector>,
}

impl Default for WhoDonExtractor {
    fn default() -> Self {
        Self {
            origin: Url::parse("https://www.who.int").expect("valid origin"),
            listing: Url::parse("https://www.who.int/emergencies/disease-outbreak-news")
                .expect("valid url"),
            content: vec![Selector::parse("div.sf-prose").expect(E)],
        }
    }
}

impl WhoDonExtractor {
    /// URL of listing page `page` (1-based).
    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.listing.clone();
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        url
    }

    fn teaser_to_record(&self, teaser: ElementRef<'_>) -> Result<RawRecord, ExtractError> {
        let a = teaser
            .select(&TITLE_LINK)
            .next()
            .ok_or(ExtractError::MissingElement("h3.teaser__title a"))?;
        let title = text_of(a);
        if title.is_empty() {
            return Err(ExtractError::Empty("teaser title"));
        }
        let href = a.value().attr("href").ok_or(ExtractError::MissingElement("a[href]"))?;

        let mut record = RawRecord::new(Source::WhoDon, title);
        record.link = Some(resolve_link(&self.origin, href)?);
        record.date = teaser.select(&TIMESTAMP).next().map(text_of);
        record.summary = teaser.select(&BODY).next().map(text_of);
        Ok(record)
    }
}

/// The `page` query parameter of a listing URL, 1 when absent.
fn page_index(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

impl SiteExtractor for WhoDonExtractor {
    fn source(&self) -> Source {
        Source::WhoDon
    }

    fn first_page(&self) -> Url {
        self.page_url(1)
    }

    #[instrument(level = "debug", skip_all, fields(page = %page_url))]
    fn extract(&self, html: &str, page_url: &Url) -> Extraction {
        let doc = Html::parse_document(html);
        let teasers: Vec<ElementRef<'_>> = doc.select(&TEASER).collect();

        let records: Vec<RawRecord> = teasers
            .iter()
            .filter_map(|t| match self.teaser_to_record(*t) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "Skipping teaser");
                    None
                }
            })
            .collect();

        let next_page = if teasers.is_empty() {
            None
        } else {
            Some(self.page_url(page_index(page_url) + 1))
        };

        info!(
            teasers = teasers.len(),
            count = records.len(),
            "Extracted WHO DON teasers"
        );
        Extraction { records, next_page }
    }

    fn content_selectors(&self) -> &[Selector] {
        &self.content
    }
}
