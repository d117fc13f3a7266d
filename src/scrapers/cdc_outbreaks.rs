//! CDC current outbreak list.
//!
//! The index at `https://www.cdc.gov/outbreaks/index.html` groups outbreaks
//! under `<h2>` section headings, each followed by a table. Only sections whose
//! heading mentions "outbreak" are read. Every table row becomes one record,
//! with header cells zipped onto data cells in `extra_fields` and the first
//! cell's link as the detail URL. Header and cell text is kept as written,
//! only trimmed, and columns keep their table order.

use super::{Extraction, SiteExtractor, pair_headings_with_blocks, text_of};
use crate::error::ExtractError;
use crate::models::{RawRecord, Source};
use crate::utils::resolve_link;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

const E: &str = "Invalid selector";
static H2: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect(E));
static H2_OR_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, table").expect(E));
static THEAD_TH: Lazy<Selector> = Lazy::new(|| Selector::parse("thead th").expect(E));
static TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect(E));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect(E));
static BODY_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect(E));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect(E));
static A: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect(E));

#[derive(Debug)]
pub struct CdcOutbreakExtractor {
    origin: Url,
    listing: Url,
    content: Vec<Selector>,
}

impl Default for CdcOutbreakExtractor {
    fn default() -> Self {
        Self {
            origin: Url::parse("https://www.cdc.gov").expect("valid origin"),
            listing: Url::parse("https://www.cdc.gov/outbreaks/index.html").expect("valid url"),
            content: vec![
                Selector::parse("div#content").expect(E),
                Selector::parse("main").expect(E),
            ],
        }
    }
}

impl SiteExtractor for CdcOutbreakExtractor {
    fn source(&self) -> Source {
        Source::CdcOutbreak
    }

    fn first_page(&self) -> Url {
        self.listing.clone()
    }

    #[instrument(level = "debug", skip_all, fields(page = %page_url))]
    fn extract(&self, html: &str, page_url: &Url) -> Extraction {
        let doc = Html::parse_document(html);
        let mut records = Vec::new();

        let sections = pair_headings_with_blocks(&doc, &H2_OR_TABLE, &H2, |el| {
            text_of(el).to_lowercase().contains("outbreak")
        });

        for (heading, table) in sections {
            let section = text_of(heading);
            let headers = table_headers(table);
            for row in body_rows(table) {
                match self.row_to_record(&section, &headers, row) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!(%section, error = %e, "Skipping table row"),
                }
            }
        }

        info!(count = records.len(), "Extracted CDC outbreak records");
        Extraction {
            records,
            next_page: None,
        }
    }

    fn content_selectors(&self) -> &[Selector] {
        &self.content
    }
}

impl CdcOutbreakExtractor {
    fn row_to_record(
        &self,
        section: &str,
        headers: &[String],
        row: ElementRef<'_>,
    ) -> Result<RawRecord, ExtractError> {
        let cells: Vec<ElementRef<'_>> = row.select(&TD).collect();
        let first = *cells.first().ok_or(ExtractError::MissingElement("td"))?;

        let first_text = text_of(first);
        let title = if first_text.is_empty() {
            section.to_string()
        } else {
            first_text
        };
        if title.is_empty() {
            return Err(ExtractError::Empty("title"));
        }

        let mut record = RawRecord::new(Source::CdcOutbreak, title);
        record.section = Some(section.to_string());
        record.extra_fields = headers
            .iter()
            .cloned()
            .zip(cells.iter().map(|c| Value::String(cell_text(*c))))
            .collect();

        if let Some(href) = first.select(&A).next().and_then(|a| a.value().attr("href")) {
            record.link = Some(resolve_link(&self.origin, href)?);
        }
        Ok(record)
    }
}

/// Cell text trimmed at the ends, inner whitespace untouched.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn table_headers(table: ElementRef<'_>) -> Vec<String> {
    let from_thead: Vec<String> = table.select(&THEAD_TH).map(cell_text).collect();
    if !from_thead.is_empty() {
        return from_thead;
    }
    table
        .select(&ROW)
        .next()
        .map(|row| row.select(&TH).map(cell_text).collect())
        .unwrap_or_default()
}

fn body_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let rows: Vec<ElementRef<'_>> = table.select(&BODY_ROW).collect();
    if rows.is_empty() {
        table.select(&ROW).collect()
    } else {
        rows
    }
}
