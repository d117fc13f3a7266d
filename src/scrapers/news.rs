//! Google News health topic headlines.
//!
//! The topic page renders each story as an `<article>`. Class names on this
//! page are generated and change often, so the lookups here stay loose: any
//! `h3`/`h4` for the headline, any element whose class mentions "sourcename"
//! (or a link whose class mentions "source") for the outlet, and the `<time>`
//! element for the timestamp text. Links are `./articles/...` relative hrefs.

use super::text_of;
use crate::error::FetchError;
use crate::fetcher::Fetch;
use crate::models::{NOT_AVAILABLE, NewsHeadline};
use crate::utils::resolve_link;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

const E: &str = "Invalid selector";
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect(E));
static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3, h4").expect(E));
static CLASSED_DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").expect(E));
static CLASSED_A: Lazy<Selector> = Lazy::new(|| Selector::parse("a[class]").expect(E));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect(E));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect(E));
static ORIGIN: Lazy<Url> = Lazy::new(|| Url::parse("https://news.google.com/").expect("valid origin"));

fn class_contains(el: &ElementRef<'_>, needle: &str) -> bool {
    el.value()
        .attr("class")
        .is_some_and(|c| c.to_lowercase().contains(needle))
}

fn or_na(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn article_to_headline(article: ElementRef<'_>) -> NewsHeadline {
    let title = article.select(&HEADLINE).next().map(text_of);

    let source = article
        .select(&CLASSED_DIV)
        .find(|el| class_contains(el, "sourcename"))
        .or_else(|| article.select(&CLASSED_A).find(|el| class_contains(el, "source")))
        .map(text_of);

    let datetime = article.select(&TIME).next().map(text_of);

    let link = article
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_link(&ORIGIN, href).ok());

    NewsHeadline {
        title: or_na(title),
        source: or_na(source),
        datetime: or_na(datetime),
        link: or_na(link),
    }
}

/// Extract every headline with at least one recognizable field.
#[instrument(level = "info", skip_all)]
pub fn extract_headlines(html: &str) -> Vec<NewsHeadline> {
    let doc = Html::parse_document(html);
    let articles: Vec<ElementRef<'_>> = doc.select(&ARTICLE).collect();
    if articles.is_empty() {
        warn!("No <article> elements found; page structure may have changed");
        return Vec::new();
    }

    let headlines: Vec<NewsHeadline> = articles
        .into_iter()
        .map(article_to_headline)
        .filter(NewsHeadline::has_content)
        .collect();
    info!(count = headlines.len(), "Extracted news headlines");
    headlines
}

/// Fetch the topic page once and extract its headlines.
#[instrument(level = "info", skip(fetcher))]
pub async fn crawl_headlines<F: Fetch>(fetcher: &F, url: &str) -> Result<Vec<NewsHeadline>, FetchError> {
    let html = fetcher.fetch(url).await?;
    Ok(extract_headlines(&html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::MockFetcher;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_article() {
        let html = r#"
            <article>
              <a href="./articles/CBMiXWh0dHBz?hl=en-IN" class="WwrzSb"></a>
              <h4>Bird flu detected in dairy herds</h4>
              <div class="vr1PYe SourceName-x">Reuters</div>
              <time datetime="2024-10-01T10:00:00Z">2 hours ago</time>
            </article>"#;

        assert_eq!(
            extract_headlines(html),
            vec![NewsHeadline {
                title: "Bird flu detected in dairy herds".into(),
                source: "Reuters".into(),
                datetime: "2 hours ago".into(),
                link: "https://news.google.com/articles/CBMiXWh0dHBz?hl=en-IN".into(),
            }]
        );
    }

    #[test]
    fn test_source_link_fallback_and_missing_fields() {
        let html = r#"
            <article>
              <h3>Measles cases climb</h3>
              <a class="source-link">Health Desk</a>
            </article>"#;

        let got = extract_headlines(html);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, "Health Desk");
        assert_eq!(got[0].datetime, NOT_AVAILABLE);
        assert_eq!(got[0].link, NOT_AVAILABLE);
    }

    #[test]
    fn test_empty_articles_are_dropped() {
        let html = r#"<article><span>ad</span></article>"#;
        assert!(extract_headlines(html).is_empty());
        assert!(extract_headlines("<p>nothing</p>").is_empty());
    }

    #[tokio::test]
    async fn test_crawl_headlines_through_fetcher() {
        let url = "https://news.google.com/topics/health";
        let fetcher = MockFetcher::new([(url, "<article><h4>Polio returns</h4></article>")]);
        let got = crawl_headlines(&fetcher, url).await.unwrap();
        assert_eq!(got[0].title, "Polio returns");

        assert!(crawl_headlines(&fetcher, "https://news.google.com/missing").await.is_err());
    }
}
