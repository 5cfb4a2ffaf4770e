//! Append-or-update article store.
//!
//! The store is the single artifact feed generation reads. It only grows:
//! a page that stops listing an article (pages show a recent window) leaves
//! the stored copy alone, and a re-scrape can only correct fields, never
//! blank them.
//!
//! # File layout
//!
//! ```text
//! {
//!   "last_updated": "2024-03-01T12:00:00Z",
//!   "articles": { "<identity>": { ...Article... }, ... }
//! }
//! ```
//!
//! The loader also accepts the older layout, a bare JSON array of
//! `{title, url, date, source}` objects, and upgrades it on the next save.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::persist::{Loaded, read_json, write_json_atomic};
use crate::error::PersistenceError;
use crate::models::{Article, ScrapedArticle, canonical_url};
use crate::scrapers::dates::parse_date;

/// Outcome counts of one [`ArticleStore::merge`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeResult {
    /// Whether the merge changed anything visible in the feeds.
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    articles: BTreeMap<String, Article>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    last_updated: Option<DateTime<Utc>>,
    articles: &'a BTreeMap<String, Article>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyArticle {
    title: String,
    url: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoreLayout {
    Current(StoreFile),
    Legacy(Vec<LegacyArticle>),
}

#[derive(Debug)]
pub struct ArticleStore {
    path: PathBuf,
    articles: BTreeMap<String, Article>,
    last_updated: Option<DateTime<Utc>>,
    extra: BTreeMap<String, Value>,
}

impl ArticleStore {
    /// Empty store that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            articles: BTreeMap::new(),
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }

    /// Load the store from `path`. Missing or corrupt files give an empty store.
    ///
    /// `now` stamps `first_seen` on articles upgraded from the legacy layout
    /// when they carry no usable date.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, now: DateTime<Utc>) -> Self {
        let mut store = Self::empty(path);
        match read_json::<StoreLayout>(path) {
            Loaded::Present(StoreLayout::Current(file)) => {
                store.articles = file.articles;
                store.last_updated = file.last_updated;
                store.extra = file.extra;
                info!(articles = store.articles.len(), "Loaded article store");
            }
            Loaded::Present(StoreLayout::Legacy(items)) => {
                let count = items.len();
                for item in items {
                    let article = upgrade_legacy(item, now);
                    store.articles.entry(article.id.clone()).or_insert(article);
                }
                info!(
                    legacy = count,
                    articles = store.articles.len(),
                    "Upgraded legacy article cache"
                );
            }
            Loaded::Missing => {}
            Loaded::Corrupt(reason) => {
                info!(%reason, "Ignoring corrupt article store; starting empty");
            }
        }
        store
    }

    /// Load the store from `path`, or, while `path` does not exist yet, from
    /// the `legacy` cache file. A store read from `legacy` is saved to `path`.
    pub fn load_or_upgrade(path: &Path, legacy: &Path, now: DateTime<Utc>) -> Self {
        if path.exists() || !legacy.exists() {
            return Self::load(path, now);
        }
        let mut store = Self::load(legacy, now);
        store.path = path.to_path_buf();
        info!(
            from = %legacy.display(),
            to = %path.display(),
            articles = store.articles.len(),
            "Migrating legacy article cache"
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Article> {
        self.articles.get(id)
    }

    /// Number of stored articles tagged with `source_id`.
    pub fn count_for_source(&self, source_id: &str) -> usize {
        self.articles.values().filter(|a| a.source == source_id).count()
    }

    /// Timestamp shown to feed readers as the last content change.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn set_last_updated(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(at);
    }

    /// Merge freshly scraped articles for `source_id` into the store.
    ///
    /// New identities are inserted. Known identities are updated in place when
    /// a field really differs; a missing date or body in the new scrape never
    /// erases the stored one. Stored articles absent from `scraped` are left
    /// untouched. Repeated identities inside `scraped` count once.
    ///
    /// An identity already stored under another source is owned by that
    /// source: it keeps its tag and fields and counts as unchanged.
    #[instrument(level = "info", skip_all, fields(source = %source_id, incoming = scraped.len()))]
    pub fn merge(
        &mut self,
        source_id: &str,
        scraped: Vec<ScrapedArticle>,
        now: DateTime<Utc>,
    ) -> MergeResult {
        let mut result = MergeResult::default();
        let mut seen = HashSet::new();

        for item in scraped {
            let id = item.identity();
            if !seen.insert(id.clone()) {
                debug!(%id, "Duplicate identity in scrape; ignoring repeat");
                continue;
            }

            match self.articles.get_mut(&id) {
                None => {
                    debug!(%id, title = %item.title, "Inserting article");
                    self.articles
                        .insert(id, Article::from_scraped(item, source_id, now));
                    result.inserted += 1;
                }
                Some(existing) => {
                    if existing.source != source_id {
                        warn!(
                            %id,
                            stored_source = %existing.source,
                            "Article already stored under another source; leaving it as is"
                        );
                        result.unchanged += 1;
                        continue;
                    }
                    if apply_observation(existing, item, now) {
                        debug!(%id, "Updated article");
                        result.updated += 1;
                    } else {
                        result.unchanged += 1;
                    }
                }
            }
        }

        info!(
            inserted = result.inserted,
            updated = result.updated,
            unchanged = result.unchanged,
            total = self.articles.len(),
            "Merged articles"
        );
        result
    }

    /// All articles in feed order: newest first, ties broken by identity.
    pub fn ordered(&self) -> Vec<&Article> {
        let mut articles: Vec<&Article> = self.articles.values().collect();
        articles.sort_by(|a, b| {
            b.effective_date()
                .cmp(&a.effective_date())
                .then_with(|| a.id.cmp(&b.id))
        });
        articles
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        let file = StoreFileRef {
            last_updated: self.last_updated,
            articles: &self.articles,
            extra: &self.extra,
        };
        write_json_atomic(&self.path, &file)
    }
}

/// Fold a new observation into a stored article. Returns whether anything changed.
fn apply_observation(existing: &mut Article, item: ScrapedArticle, now: DateTime<Utc>) -> bool {
    let title = if item.title.trim().is_empty() {
        existing.title.clone()
    } else {
        item.title
    };
    let url = if item.url.trim().is_empty() {
        existing.url.clone()
    } else {
        item.url
    };
    let published = item.published.or(existing.published);
    let body = item.body.or_else(|| existing.body.clone());

    let changed = title != existing.title
        || url != existing.url
        || published != existing.published
        || body != existing.body;

    if changed {
        existing.title = title;
        existing.url = url;
        existing.published = published;
        existing.body = body;
        existing.updated_at = now;
    }
    changed
}

fn upgrade_legacy(item: LegacyArticle, now: DateTime<Utc>) -> Article {
    let published = item.date.as_deref().and_then(parse_date);
    let seen = published.unwrap_or(now);
    Article {
        id: canonical_url(&item.url),
        title: item.title,
        url: item.url,
        source: item.source.unwrap_or_else(|| "unknown".to_string()),
        published,
        first_seen: seen,
        updated_at: seen,
        body: item.summary,
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn scraped(slug: &str, title: &str, published: Option<DateTime<Utc>>) -> ScrapedArticle {
        ScrapedArticle {
            id: None,
            title: title.to_string(),
            url: format!("https://www.anthropic.com/news/{slug}"),
            published,
            body: None,
        }
    }

    fn store_with_a_and_b() -> ArticleStore {
        let mut store = ArticleStore::empty("unused.json");
        store.merge(
            "news",
            vec![
                scraped("a", "A", Some(day(1))),
                scraped("b", "B", Some(day(2))),
            ],
            day(2),
        );
        store
    }

    #[test]
    fn test_merge_window_scenario() {
        let mut store = store_with_a_and_b();

        let result = store.merge(
            "news",
            vec![
                scraped("b", "B", Some(day(2))),
                scraped("c", "C", Some(day(3))),
            ],
            day(3),
        );

        assert_eq!(
            result,
            MergeResult {
                inserted: 1,
                updated: 0,
                unchanged: 1
            }
        );
        assert_eq!(store.count_for_source("news"), 3);
        for slug in ["a", "b", "c"] {
            assert!(store.get(&format!("https://www.anthropic.com/news/{slug}")).is_some());
        }
    }

    #[test]
    fn test_merge_updates_corrected_title_in_place() {
        let mut store = store_with_a_and_b();

        let result = store.merge("news", vec![scraped("a", "A (corrected)", Some(day(1)))], day(4));

        assert_eq!(result.updated, 1);
        let a = store.get("https://www.anthropic.com/news/a").unwrap();
        assert_eq!(a.title, "A (corrected)");
        assert_eq!(a.first_seen, day(2));
        assert_eq!(a.updated_at, day(4));
    }

    #[test]
    fn test_missing_date_is_a_reobservation_not_an_update() {
        let mut store = store_with_a_and_b();

        let result = store.merge("news", vec![scraped("a", "A", None)], day(5));

        assert_eq!(result.unchanged, 1);
        assert!(!result.changed());
        assert_eq!(store.get("https://www.anthropic.com/news/a").unwrap().published, Some(day(1)));
    }

    #[test]
    fn test_merge_is_superset_of_previous_store() {
        let mut store = store_with_a_and_b();
        let before: Vec<String> = store.ordered().iter().map(|a| a.id.clone()).collect();

        store.merge("news", vec![], day(6));
        store.merge("news", vec![scraped("z", "Z", None)], day(7));

        for id in before {
            assert!(store.get(&id).is_some(), "{id} disappeared");
        }
    }

    #[test]
    fn test_duplicate_identities_in_one_scrape_count_once() {
        let mut store = ArticleStore::empty("unused.json");
        let mut dup = scraped("a", "A", Some(day(1)));
        dup.url.push('/');

        let result = store.merge("news", vec![scraped("a", "A", Some(day(1))), dup], day(1));

        assert_eq!(result.inserted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_identity_stored_under_other_source_keeps_tag() {
        let mut store = store_with_a_and_b();

        let result = store.merge("research", vec![scraped("a", "A", Some(day(1)))], day(8));

        assert_eq!(result.unchanged, 1);
        assert_eq!(store.get("https://www.anthropic.com/news/a").unwrap().source, "news");
    }

    #[test]
    fn test_other_source_cannot_rewrite_fields() {
        let mut store = store_with_a_and_b();
        let before = store.get("https://www.anthropic.com/news/a").unwrap().clone();

        let result = store.merge("research", vec![scraped("a", "Renamed", Some(day(5)))], day(8));

        assert_eq!(result, MergeResult { inserted: 0, updated: 0, unchanged: 1 });
        assert!(!result.changed());
        let after = store.get("https://www.anthropic.com/news/a").unwrap();
        assert_eq!(after.title, before.title);
        assert_eq!(after.published, before.published);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[test]
    fn test_ordering_newest_first_ties_by_identity() {
        let mut store = ArticleStore::empty("unused.json");
        store.merge(
            "news",
            vec![
                scraped("b", "B", Some(day(2))),
                scraped("a", "A", Some(day(2))),
                scraped("c", "C", Some(day(3))),
                scraped("old", "Old", Some(day(1))),
            ],
            day(9),
        );

        let titles: Vec<&str> = store.ordered().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B", "Old"]);
    }

    #[test]
    fn test_save_and_load_preserves_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        let json = r#"{
            "last_updated": "2024-01-02T00:00:00Z",
            "schema_version": 3,
            "articles": {
                "https://www.anthropic.com/news/a": {
                    "id": "https://www.anthropic.com/news/a",
                    "title": "A",
                    "url": "https://www.anthropic.com/news/a",
                    "source": "news",
                    "published": "2024-01-01T00:00:00Z",
                    "first_seen": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z",
                    "reading_time": 7
                }
            }
        }"#;
        std::fs::write(&path, json).unwrap();

        let mut store = ArticleStore::load(&path, day(10));
        store.merge("news", vec![scraped("b", "B", Some(day(2)))], day(10));
        store.save().unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], 3);
        assert_eq!(raw["articles"]["https://www.anthropic.com/news/a"]["reading_time"], 7);
        assert_eq!(raw["last_updated"], "2024-01-02T00:00:00Z");

        let reloaded = ArticleStore::load(&path, day(11));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.last_updated(), Some(day(2)));
    }

    #[test]
    fn test_legacy_array_layout_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        let json = r#"[
            {"title": "A", "url": "https://www.anthropic.com/news/a", "date": "2024-01-01T00:00:00+00:00", "source": "news"},
            {"title": "P", "url": "https://arxiv.org/abs/2401.00001", "date": "", "source": "research"}
        ]"#;
        std::fs::write(&path, json).unwrap();

        let store = ArticleStore::load(&path, day(20));

        assert_eq!(store.len(), 2);
        let a = store.get("https://www.anthropic.com/news/a").unwrap();
        assert_eq!(a.published, Some(day(1)));
        let p = store.get("https://arxiv.org/abs/2401.00001").unwrap();
        assert_eq!(p.published, None);
        assert_eq!(p.first_seen, day(20));
    }

    #[test]
    fn test_current_store_wins_over_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        let legacy = dir.path().join("anthropic_articles.json");
        std::fs::write(&legacy, r#"[{"title": "Old", "url": "https://www.anthropic.com/news/old"}]"#).unwrap();
        let mut current = ArticleStore::empty(path.clone());
        current.merge("news", vec![scraped("a", "A", Some(day(1)))], day(2));
        current.save().unwrap();

        let store = ArticleStore::load_or_upgrade(&path, &legacy, day(3));

        assert_eq!(store.len(), 1);
        assert!(store.get("https://www.anthropic.com/news/a").is_some());
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(&path, "{\"articles\": [").unwrap();

        let store = ArticleStore::load(&path, day(1));
        assert!(store.is_empty());
        assert_eq!(store.last_updated(), None);
    }
}
