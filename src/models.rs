//! Data models shared by the fetch, cache and feed layers.
//!
//! - [`Source`]: a configured page to scrape
//! - [`ScrapedArticle`]: what an extractor pulls out of one page
//! - [`Article`]: an article as persisted in the store
//! - [`HttpCacheEntry`] / [`Validators`]: per-source conditional request state
//!
//! Persisted types carry a flattened `extra` map so fields written by a newer
//! version of the program survive a load/save cycle through an older one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Page layout a source is scraped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// Listing of `/news/...` links with a heading and a `<time>` each.
    News,
    /// Publication cards plus outbound links to papers.
    Research,
}

/// A configured page to scrape. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable identifier, also used as the article source tag ("news", "research").
    pub id: String,
    /// Page URL.
    pub url: String,
    /// Extraction layout for this page.
    pub layout: SourceLayout,
    /// Base for resolving relative links. Defaults to `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Source {
    /// URL relative article links are resolved against.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(&self.url)
    }
}

/// HTTP validators used to build a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Conditional request state for one source.
///
/// An entry with neither validators nor a `last_changed` timestamp has never
/// been fetched successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpCacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Last time the source was checked, successfully or not.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    /// Last time the server returned new content.
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HttpCacheEntry {
    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }

    /// Whether this source has ever produced content.
    pub fn has_succeeded(&self) -> bool {
        self.last_changed.is_some() || self.etag.is_some() || self.last_modified.is_some()
    }

    /// Server answered 304: only the check time moves.
    pub fn record_unchanged(&mut self, now: DateTime<Utc>, status: u16) {
        self.last_checked = Some(now);
        self.last_status = Some(status);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// New content was fetched and accepted: validators are replaced wholesale,
    /// so a validator the server stopped sending is dropped too.
    pub fn record_changed(&mut self, now: DateTime<Utc>, validators: Validators, status: u16) {
        self.etag = validators.etag;
        self.last_modified = validators.last_modified;
        self.last_checked = Some(now);
        self.last_changed = Some(now);
        self.last_status = Some(status);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// The check failed. Validators are left alone.
    pub fn record_failure(&mut self, now: DateTime<Utc>, status: Option<u16>, error: String) {
        self.last_checked = Some(now);
        if status.is_some() {
            self.last_status = status;
        }
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

/// One item as extracted from a page, before it meets the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedArticle {
    /// Explicit identity, when the page provides one. Otherwise the canonical URL is used.
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    /// `None` when the page showed no parseable date.
    pub published: Option<DateTime<Utc>>,
    /// Optional rendered HTML fragment (summary or teaser).
    pub body: Option<String>,
}

impl ScrapedArticle {
    /// Stable identity of this item across runs.
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => canonical_url(&self.url),
        }
    }
}

/// An article as stored in the article store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Source tag, descriptive only.
    pub source: String,
    /// Publication date shown on the page, if any was ever observed.
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// When this article was first extracted.
    pub first_seen: DateTime<Utc>,
    /// When a field of this article last changed in the store.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Article {
    /// Build a fresh store entry from a scraped item.
    pub fn from_scraped(scraped: ScrapedArticle, source_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: scraped.identity(),
            title: scraped.title,
            url: scraped.url,
            source: source_id.to_string(),
            published: scraped.published,
            first_seen: now,
            updated_at: now,
            body: scraped.body,
            extra: BTreeMap::new(),
        }
    }

    /// Date used for feed ordering and display: the publication date, or the
    /// first time the article was seen when the page never showed one.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published.unwrap_or(self.first_seen)
    }
}

/// Canonical form of an article URL, used as its identity.
///
/// Drops the fragment and a trailing slash on non-root paths. Unparseable
/// input is only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                url.set_path(path.trim_end_matches('/'));
            }
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_canonical_url_strips_fragment_and_trailing_slash() {
        assert_eq!(
            canonical_url("https://www.anthropic.com/news/claude-3/#intro"),
            "https://www.anthropic.com/news/claude-3"
        );
        assert_eq!(canonical_url("https://WWW.Anthropic.com/"), "https://www.anthropic.com/");
        assert_eq!(canonical_url("  not a url "), "not a url");
    }

    #[test]
    fn test_identity_prefers_explicit_id() {
        let mut scraped = ScrapedArticle {
            id: Some("paper-42".to_string()),
            title: "A paper".to_string(),
            url: "https://arxiv.org/abs/2401.00001".to_string(),
            published: None,
            body: None,
        };
        assert_eq!(scraped.identity(), "paper-42");

        scraped.id = Some("   ".to_string());
        assert_eq!(scraped.identity(), "https://arxiv.org/abs/2401.00001");
    }

    #[test]
    fn test_effective_date_falls_back_to_first_seen() {
        let scraped = ScrapedArticle {
            id: None,
            title: "Undated".to_string(),
            url: "https://www.anthropic.com/news/undated".to_string(),
            published: None,
            body: None,
        };
        let article = Article::from_scraped(scraped, "news", ts(5));
        assert_eq!(article.effective_date(), ts(5));
        assert_eq!(article.source, "news");
        assert_eq!(article.id, "https://www.anthropic.com/news/undated");
    }

    #[test]
    fn test_article_unknown_fields_round_trip() {
        let json = r#"{
            "id": "a",
            "title": "A",
            "url": "https://example.com/a",
            "source": "news",
            "published": "2024-01-01T00:00:00Z",
            "first_seen": "2024-01-02T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "summary_v2": {"lang": "en", "text": "hello"}
        }"#;

        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.extra["summary_v2"]["text"], "hello");

        let back = serde_json::to_value(&article).unwrap();
        assert_eq!(back["summary_v2"]["lang"], "en");
        assert_eq!(back["published"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_cache_entry_lifecycle() {
        let mut entry = HttpCacheEntry::default();
        assert!(!entry.has_succeeded());

        entry.record_failure(ts(1), Some(503), "unexpected HTTP status 503".into());
        assert!(!entry.has_succeeded());
        assert_eq!(entry.consecutive_failures, 1);
        assert_eq!(entry.last_checked, Some(ts(1)));

        entry.record_changed(
            ts(2),
            Validators { etag: Some("\"abc\"".into()), last_modified: None },
            200,
        );
        assert!(entry.has_succeeded());
        assert_eq!(entry.consecutive_failures, 0);
        assert_eq!(entry.last_changed, Some(ts(2)));

        entry.record_unchanged(ts(3), 304);
        assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
        assert_eq!(entry.last_checked, Some(ts(3)));
        assert_eq!(entry.last_changed, Some(ts(2)));
    }

    #[test]
    fn test_source_base_url_defaults_to_page_url() {
        let source = Source {
            id: "news".into(),
            url: "https://www.anthropic.com/news".into(),
            layout: SourceLayout::News,
            base_url: None,
        };
        assert_eq!(source.base_url(), "https://www.anthropic.com/news");
    }
}
