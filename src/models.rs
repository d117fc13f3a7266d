//! Data models for crawled records and LLM-backed named datasets.
//!
//! - [`RawRecord`]: one outbreak or travel-notice record in the unified crawl schema
//! - [`NewsHeadline`]: one row of the health-news headline CSV
//! - [`Category`]: the three named datasets kept fresh by the refresh workflow,
//!   with the item types their backend responses are validated against

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which public health site a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    CdcOutbreak,
    CdcTravelNotice,
    WhoDon,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::CdcOutbreak => "CDC_OUTBREAK",
            Source::CdcTravelNotice => "CDC_TRAVEL_NOTICE",
            Source::WhoDon => "WHO_DON",
        };
        f.write_str(s)
    }
}

/// A crawled record, normalized across sources.
///
/// Only the CDC outbreak table carries `extra_fields`; only WHO teasers carry
/// `summary` and `date`. `full_text` is filled in later by the detail enricher
/// and stays `None` when the detail page could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    /// Table header to cell text, in column order.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(source: Source, title: impl Into<String>) -> Self {
        Self {
            source,
            title: title.into(),
            section: None,
            level: None,
            link: None,
            summary: None,
            date: None,
            full_text: None,
            extra_fields: Map::new(),
        }
    }

    /// The detail link, if it is present and non-blank.
    pub fn detail_link(&self) -> Option<&str> {
        self.link.as_deref().filter(|l| !l.trim().is_empty())
    }
}

/// Placeholder used for headline fields the page did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// A health-news headline as written to the CSV export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsHeadline {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Datetime")]
    pub datetime: String,
    #[serde(rename = "Link")]
    pub link: String,
}

impl NewsHeadline {
    /// A headline is worth keeping when any of its fields was found.
    pub fn has_content(&self) -> bool {
        [&self.title, &self.source, &self.datetime, &self.link]
            .iter()
            .any(|f| f.as_str() != NOT_AVAILABLE)
    }
}

/// One of the three independently persisted named datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Diseases,
    Outbreaks,
    Meds,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Diseases => "diseases",
            Category::Outbreaks => "outbreaks",
            Category::Meds => "meds",
        }
    }

    /// The key the refreshed list is reported under, e.g. `top_diseases`.
    pub fn response_key(&self) -> String {
        format!("top_{}", self.as_str())
    }

    /// Whether the backend should ground this request with live web search.
    pub fn wants_search_grounding(&self) -> bool {
        matches!(self, Category::Outbreaks)
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Category::Diseases => DISEASES_PROMPT,
            Category::Outbreaks => OUTBREAKS_PROMPT,
            Category::Meds => MEDS_PROMPT,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DISEASES_PROMPT: &str = r#"Please respond ONLY with a JSON array of the top 3 diseases currently spreading worldwide.
Do not include code fences, explanations, or extra text.
Each item must have:
- "name": disease name
- "location": geographic area
- "cases": estimated number of people affected
- "reference_url": source URL"#;

const OUTBREAKS_PROMPT: &str = r#"Please return a JSON array of the top 10 recent verified health news stories focused on disease outbreaks. Each entry should be an object with the following fields:
- "headline": (string) the title of the news article.
- "imageurl": (string) the URL of an image associated with the news (if available, otherwise empty string).
- "summary": (string) a concise summary of the news content.
- "affected_count": (integer or null) the number of confirmed affected cases, or null if unavailable.
- "cured_count": (integer or null) the number of confirmed cured/recovered cases, or null if unavailable.
- "threat_level": (string) one of "Low", "Moderate", or "High", based on severity.
Return exactly 10 items. Ensure all values are properly typed, and where data isn't available, use null."#;

const MEDS_PROMPT: &str = r#"Please respond ONLY with a JSON array of the 5 medications or treatments most relevant to the diseases currently spreading worldwide.
Do not include code fences, explanations, or extra text.
Each item must have:
- "name": medication or treatment name
- "used_for": the disease or condition it treats
- "availability": how it is obtained (e.g. "prescription", "over the counter", "vaccination programme")
- "reference_url": source URL"#;

/// An affected-people estimate, which models report either as a number or as prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseCount {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disease {
    pub name: String,
    pub location: String,
    pub cases: CaseCount,
    pub reference_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutbreakStory {
    pub headline: String,
    #[serde(default)]
    pub imageurl: String,
    pub summary: String,
    pub affected_count: Option<u64>,
    pub cured_count: Option<u64>,
    pub threat_level: ThreatLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub used_for: String,
    pub availability: String,
    pub reference_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_serialization_skips_absent_fields() {
        let mut record = RawRecord::new(Source::WhoDon, "Cholera - Sudan");
        record.link = Some("https://www.who.int/emergencies/disease-outbreak-news/item/x".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source": "WHO_DON",
                "title": "Cholera - Sudan",
                "link": "https://www.who.int/emergencies/disease-outbreak-news/item/x"
            })
        );
    }

    #[test]
    fn test_detail_link_ignores_blank() {
        let mut record = RawRecord::new(Source::CdcOutbreak, "x");
        assert_eq!(record.detail_link(), None);
        record.link = Some("  ".into());
        assert_eq!(record.detail_link(), None);
        record.link = Some("https://www.cdc.gov/a".into());
        assert_eq!(record.detail_link(), Some("https://www.cdc.gov/a"));
    }

    #[test]
    fn test_headline_has_content() {
        let na = || NOT_AVAILABLE.to_string();
        let empty = NewsHeadline { title: na(), source: na(), datetime: na(), link: na() };
        assert!(!empty.has_content());
        let titled = NewsHeadline { title: "Measles rises".into(), ..empty.clone() };
        assert!(titled.has_content());
    }

    #[test]
    fn test_case_count_accepts_number_or_text() {
        let d: Disease = serde_json::from_str(
            r#"{"name":"Mpox","location":"DRC","cases":"over 20,000","reference_url":"https://who.int"}"#,
        )
        .unwrap();
        assert_eq!(d.cases, CaseCount::Text("over 20,000".into()));

        let d: Disease = serde_json::from_str(
            r#"{"name":"Dengue","location":"Brazil","cases":1200000,"reference_url":"https://paho.org"}"#,
        )
        .unwrap();
        assert_eq!(d.cases, CaseCount::Number(1_200_000));
    }

    #[test]
    fn test_category_keys() {
        assert_eq!(Category::Diseases.response_key(), "top_diseases");
        assert!(Category::Outbreaks.wants_search_grounding());
        assert!(!Category::Meds.wants_search_grounding());
    }
}
