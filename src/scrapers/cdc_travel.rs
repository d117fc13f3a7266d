//! CDC travel health notices.
//!
//! `https://wwwnc.cdc.gov/travel/notices` lists notices under one `<h3>` per
//! severity level, each followed by a `<ul>`. Every list item with a link is a
//! notice.

use super::{Extraction, SiteExtractor, pair_headings_with_blocks, text_of};
use crate::error::ExtractError;
use crate::models::{RawRecord, Source};
use crate::utils::resolve_link;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

const E: &str = "Invalid selector";
static H3: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect(E));
static H3_OR_UL: Lazy<Selector> = Lazy::new(|| Selector::parse("h3, ul").expect(E));
static LI: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect(E));
static A: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect(E));

pub const TRAVEL_SECTION: &str = "International Travel Health Notices";

#[derive(Debug)]
pub struct CdcTravelExtractor {
    origin: Url,
    listing: Url,
    content: Vec<Selector>,
}

impl Default for CdcTravelExtractor {
    fn default() -> Self {
        Self {
            origin: Url::parse("https://wwwnc.cdc.gov").expect("valid origin"),
            listing: Url::parse("https://wwwnc.cdc.gov/travel/notices").expect("valid url"),
            content: vec![Selector::parse("div#content").expect(E)],
        }
    }
}

impl SiteExtractor for CdcTravelExtractor {
    fn source(&self) -> Source {
        Source::CdcTravelNotice
    }

    fn first_page(&self) -> Url {
        self.listing.clone()
    }

    #[instrument(level = "debug", skip_all, fields(page = %page_url))]
    fn extract(&self, html: &str, page_url: &Url) -> Extraction {
        let doc = Html::parse_document(html);
        let mut records = Vec::new();

        for (heading, list) in pair_headings_with_blocks(&doc, &H3_OR_UL, &H3, |_| true) {
            let level = text_of(heading);
            for item in list.select(&LI) {
                match self.item_to_record(&level, item) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!(%level, error = %e, "Skipping notice"),
                }
            }
        }

        info!(count = records.len(), "Extracted CDC travel notices");
        Extraction {
            records,
            next_page: None,
        }
    }

    fn content_selectors(&self) -> &[Selector] {
        &self.content
    }
}

impl CdcTravelExtractor {
    fn item_to_record(&self, level: &str, item: ElementRef<'_>) -> Result<RawRecord, ExtractError> {
        let a = item.select(&A).next().ok_or(ExtractError::MissingElement("a"))?;
        let title = text_of(a);
        if title.is_empty() {
            return Err(ExtractError::Empty("notice title"));
        }
        let href = a.value().attr("href").ok_or(ExtractError::MissingElement("a[href]"))?;

        let mut record = RawRecord::new(Source::CdcTravelNotice, title);
        record.level = Some(level.to_string());
        record.section = Some(TRAVEL_SECTION.to_string());
        record.link = Some(resolve_link(&self.origin, href)?);
        Ok(record)
    }
}
