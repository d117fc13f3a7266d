//! Crawl pipeline: paginate, extract, enrich, aggregate.
//!
//! Every configured source runs as its own tokio task with its own fetcher
//! handle and [`RateLimiter`], so requests within a source are strictly
//! sequential and spaced while sources proceed side by side. Each task sends
//! one [`SourceBatch`] to the aggregating [`CrawlSession`] over an mpsc
//! channel; the session restores the configured source order no matter which
//! task finishes first.
//!
//! Fetch and extraction failures never end the run. A dead listing page ends
//! that source's pagination, a dead detail page just leaves `full_text` empty.

use crate::config::CrawlConfig;
use crate::fetcher::Fetch;
use crate::models::{RawRecord, Source};
use crate::rate_limit::RateLimiter;
use crate::scrapers::{ExtractorKind, SiteExtractor, extract_full_text};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Drives one extractor across successive listing pages.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    pub max_pages: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self { max_pages: 1000 }
    }
}

impl Paginator {
    /// Collect records page by page until a page yields nothing, the source
    /// stops offering a next page, a listing fetch fails, or `max_pages` pages
    /// have been visited.
    #[instrument(level = "info", skip_all, fields(source = %extractor.source()))]
    pub async fn collect<F: Fetch>(
        &self,
        extractor: &dyn SiteExtractor,
        fetcher: &F,
        limiter: &mut RateLimiter,
    ) -> Vec<RawRecord> {
        let mut records = Vec::new();
        let mut url = extractor.first_page();
        let mut pages = 0usize;

        loop {
            if pages >= self.max_pages {
                warn!(max_pages = self.max_pages, "Page ceiling reached; stopping pagination");
                break;
            }
            pages += 1;

            limiter.wait().await;
            let html = match fetcher.fetch(url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    error!(%url, error = %e, "Listing page unavailable; ending pagination");
                    break;
                }
            };

            let extraction = extractor.extract(&html, &url);
            if extraction.records.is_empty() {
                debug!(%url, "Page yielded no records; listing exhausted");
                break;
            }
            records.extend(extraction.records);

            match extraction.next_page {
                Some(next) => url = next,
                None => break,
            }
        }

        info!(pages, count = records.len(), "Pagination finished");
        records
    }
}

/// Fetch each record's detail page and attach its body text.
///
/// Records without a link are left untouched and cost no request.
#[instrument(level = "info", skip_all, fields(source = %extractor.source(), count = records.len()))]
pub async fn enrich_records<F: Fetch>(
    records: &mut [RawRecord],
    extractor: &dyn SiteExtractor,
    fetcher: &F,
    limiter: &mut RateLimiter,
) {
    let mut enriched = 0usize;
    for record in records.iter_mut() {
        let Some(link) = record.detail_link().map(str::to_string) else {
            continue;
        };

        limiter.wait().await;
        match fetcher.fetch(&link).await {
            Ok(html) => match extract_full_text(&html, extractor.content_selectors()) {
                Some(text) => {
                    record.full_text = Some(text);
                    enriched += 1;
                }
                None => debug!(%link, "No content container on detail page"),
            },
            Err(e) => warn!(%link, error = %e, "Detail page unavailable"),
        }
    }
    info!(enriched, "Detail enrichment finished");
}

/// Everything one source task produced.
#[derive(Debug)]
pub struct SourceBatch {
    /// Position of the source in the configured order.
    pub order: usize,
    pub source: Source,
    pub records: Vec<RawRecord>,
}

/// Paginate and enrich a single source.
pub async fn crawl_source<F: Fetch>(
    extractor: &dyn SiteExtractor,
    fetcher: &F,
    limiter: &mut RateLimiter,
    paginator: Paginator,
) -> Vec<RawRecord> {
    let mut records = paginator.collect(extractor, fetcher, limiter).await;
    enrich_records(&mut records, extractor, fetcher, limiter).await;
    records
}

/// Owns the aggregated sequence for one crawl run.
#[derive(Debug, Default)]
pub struct CrawlSession {
    batches: BTreeMap<usize, SourceBatch>,
    dropped: usize,
}

impl CrawlSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a finished source batch, dropping records that have no link.
    pub fn accept(&mut self, mut batch: SourceBatch) {
        let before = batch.records.len();
        batch.records.retain(|r| r.detail_link().is_some());
        let dropped = before - batch.records.len();
        if dropped > 0 {
            warn!(source = %batch.source, dropped, "Dropped records without a link");
        }
        self.dropped += dropped;
        info!(source = %batch.source, count = batch.records.len(), "Source batch received");
        self.batches.insert(batch.order, batch);
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Concatenate all batches in source order.
    pub fn finish(self) -> Vec<RawRecord> {
        self.batches
            .into_values()
            .flat_map(|batch| batch.records)
            .collect()
    }
}

/// Crawl every configured source concurrently and return the aggregated dataset.
#[instrument(level = "info", skip_all, fields(sources = config.sources.len()))]
pub async fn run_crawl<F>(config: &CrawlConfig, fetcher: F) -> Vec<RawRecord>
where
    F: Fetch + Clone + Send + Sync + 'static,
{
    let kinds: Vec<ExtractorKind> = config.sources.clone();
    let extractors = kinds.into_iter().map(ExtractorKind::build).collect();
    run_extractors(config, extractors, fetcher).await
}

async fn run_extractors<F>(
    config: &CrawlConfig,
    extractors: Vec<Box<dyn SiteExtractor>>,
    fetcher: F,
) -> Vec<RawRecord>
where
    F: Fetch + Clone + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<SourceBatch>(extractors.len().max(1));
    let paginator = Paginator {
        max_pages: config.max_pages,
    };

    let mut handles = Vec::with_capacity(extractors.len());
    for (order, extractor) in extractors.into_iter().enumerate() {
        let tx = tx.clone();
        let fetcher = fetcher.clone();
        let mut limiter = RateLimiter::new(config.rate_limit());
        handles.push(tokio::spawn(async move {
            let source = extractor.source();
            let records = crawl_source(extractor.as_ref(), &fetcher, &mut limiter, paginator).await;
            if tx.send(SourceBatch { order, source, records }).await.is_err() {
                error!(%source, "Aggregator went away before batch was delivered");
            }
        }));
    }
    // Drop our copy of tx so rx closes when all source tasks finish
    drop(tx);

    let mut session = CrawlSession::new();
    while let Some(batch) = rx.recv().await {
        session.accept(batch);
    }

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Source task failed");
        }
    }

    let dropped = session.dropped();
    let records = session.finish();
    info!(count = records.len(), dropped, "Crawl aggregated");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::MockFetcher;
    use crate::scrapers::{CdcOutbreakExtractor, CdcTravelExtractor, WhoDonExtractor};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn who_page(items: &[(&str, &str)]) -> String {
        items
            .iter()
            .map(|(title, href)| {
                format!(
                    r#"<article class="teaser"><h3 class="teaser__title"><a href="{href}">{title}</a></h3></article>"#
                )
            })
            .collect()
    }

    fn no_delay() -> RateLimiter {
        RateLimiter::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_pagination_stops_after_first_empty_page() {
        let who = WhoDonExtractor::default();
        let fetcher = MockFetcher::new([
            (who.page_url(1).to_string(), who_page(&[("A", "/don/a")])),
            (who.page_url(2).to_string(), who_page(&[("B", "/don/b")])),
            (who.page_url(3).to_string(), "<main>No more results</main>".to_string()),
            (who.page_url(4).to_string(), who_page(&[("never", "/don/never")])),
        ]);

        let records = Paginator::default()
            .collect(&who, &fetcher, &mut no_delay())
            .await;

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(
            fetcher.calls(),
            vec![
                who.page_url(1).to_string(),
                who.page_url(2).to_string(),
                who.page_url(3).to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_pagination_ceiling_bounds_endless_source() {
        let who = WhoDonExtractor::default();
        let pages: Vec<(String, String)> = (1..=20)
            .map(|n| (who.page_url(n).to_string(), who_page(&[("x", "/don/x")])))
            .collect();
        let fetcher = MockFetcher::new(pages);

        let records = Paginator { max_pages: 5 }
            .collect(&who, &fetcher, &mut no_delay())
            .await;
        assert_eq!(records.len(), 5);
        assert_eq!(fetcher.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_pagination_ends_on_listing_fetch_failure() {
        let who = WhoDonExtractor::default();
        let fetcher = MockFetcher::new([(who.page_url(1).to_string(), who_page(&[("A", "/a")]))]);

        let records = Paginator::default()
            .collect(&who, &fetcher, &mut no_delay())
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_enrichment_skips_linkless_and_tolerates_failures() {
        let cdc = CdcOutbreakExtractor::default();
        let mut with_page = RawRecord::new(Source::CdcOutbreak, "Salmonella");
        with_page.link = Some("https://www.cdc.gov/salmonella/a.html".into());
        let mut dead = RawRecord::new(Source::CdcOutbreak, "Listeria");
        dead.link = Some("https://www.cdc.gov/listeria/gone.html".into());
        let linkless = RawRecord::new(Source::CdcOutbreak, "Measles");

        let fetcher = MockFetcher::new([(
            "https://www.cdc.gov/salmonella/a.html",
            r#"<div id="content"><p>Investigation notice.</p><p>Recall issued.</p></div>"#,
        )]);

        let mut records = vec![with_page, dead, linkless];
        enrich_records(&mut records, &cdc, &fetcher, &mut no_delay()).await;

        assert_eq!(
            records[0].full_text.as_deref(),
            Some("Investigation notice.\nRecall issued.")
        );
        assert_eq!(records[1].full_text, None);
        assert_eq!(records[2].full_text, None);
        assert_eq!(
            fetcher.calls(),
            vec![
                "https://www.cdc.gov/salmonella/a.html".to_string(),
                "https://www.cdc.gov/listeria/gone.html".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_listing_and_detail_fetch_is_spaced() {
        let who = WhoDonExtractor::default();
        let fetcher = MockFetcher::new([
            (who.page_url(1).to_string(), who_page(&[("A", "/don/a")])),
            (who.page_url(2).to_string(), who_page(&[("B", "/don/b")])),
            (who.page_url(3).to_string(), String::new()),
            (
                "https://www.who.int/don/a".to_string(),
                r#"<div class="sf-prose"><p>Detail A</p></div>"#.to_string(),
            ),
            (
                "https://www.who.int/don/b".to_string(),
                r#"<div class="sf-prose"><p>Detail B</p></div>"#.to_string(),
            ),
        ]);
        let mut limiter = RateLimiter::new(Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let records = crawl_source(&who, &fetcher, &mut limiter, Paginator::default()).await;
        let elapsed = start.elapsed();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].full_text.as_deref(), Some("Detail B"));
        assert_eq!(fetcher.calls().len(), 5);
        // Five requests, four gaps of at least one second.
        assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_session_orders_batches_and_drops_linkless() {
        let mut linked = RawRecord::new(Source::WhoDon, "who");
        linked.link = Some("https://www.who.int/x".into());
        let mut cdc = RawRecord::new(Source::CdcOutbreak, "cdc");
        cdc.link = Some("https://www.cdc.gov/x".into());

        let mut session = CrawlSession::new();
        session.accept(SourceBatch {
            order: 2,
            source: Source::WhoDon,
            records: vec![linked],
        });
        session.accept(SourceBatch {
            order: 0,
            source: Source::CdcOutbreak,
            records: vec![cdc, RawRecord::new(Source::CdcOutbreak, "no link")],
        });

        assert_eq!(session.dropped(), 1);
        let titles: Vec<String> = session.finish().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["cdc".to_string(), "who".to_string()]);
    }

    #[tokio::test]
    async fn test_run_crawl_merges_sources_in_order() {
        let cdc = CdcOutbreakExtractor::default();
        let travel = CdcTravelExtractor::default();
        let who = WhoDonExtractor::default();

        let fetcher = MockFetcher::new([
            (
                cdc.first_page().to_string(),
                r#"<h2>Current Outbreaks</h2><table>
                     <thead><tr><th>Name</th></tr></thead>
                     <tbody>
                       <tr><td><a href="/o/1.html">Outbreak one</a></td></tr>
                       <tr><td>Unlinked row</td></tr>
                     </tbody></table>"#
                    .to_string(),
            ),
            (
                "https://www.cdc.gov/o/1.html".to_string(),
                r#"<main><p>Body one.</p></main>"#.to_string(),
            ),
            (
                travel.first_page().to_string(),
                r#"<h3>Level 1</h3><ul><li><a href="/travel/notices/level1/polio">Polio</a></li></ul>"#
                    .to_string(),
            ),
            (who.page_url(1).to_string(), who_page(&[("DON 1", "/don/1")])),
            (who.page_url(2).to_string(), String::new()),
        ]);

        let config = CrawlConfig {
            rate_limit_ms: 0,
            ..CrawlConfig::default()
        };
        let records = run_crawl(&config, fetcher).await;

        let summary: Vec<(Source, &str)> = records
            .iter()
            .map(|r| (r.source, r.title.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Source::CdcOutbreak, "Outbreak one"),
                (Source::CdcTravelNotice, "Polio"),
                (Source::WhoDon, "DON 1"),
            ]
        );
        assert_eq!(records[0].full_text.as_deref(), Some("Body one."));
        assert_eq!(
            records[1].link.as_deref(),
            Some("https://wwwnc.cdc.gov/travel/notices/level1/polio")
        );
    }
}
