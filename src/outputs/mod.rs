//! Feed generation from the article store.
//!
//! Feeds are rebuilt from the persisted store on every run and written
//! atomically, so a reader never sees a half-written file. Item order is the
//! store's total order (newest first, ties by identity), which keeps the
//! output byte-stable when nothing changed.
//!
//! # Submodules
//!
//! - [`atom`]: Atom 1.0, written as `feed.atom` and again as `feed.xml`
//! - [`rss`]: RSS 2.0, written as `rss.xml`
//! - [`json`]: JSON Feed 1.1, written as `feed.json`
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── feed.atom
//! ├── feed.xml          # same bytes as feed.atom
//! ├── rss.xml
//! ├── feed.json
//! └── last_update.txt   # "Last updated: <RFC 3339>"
//! ```

pub mod atom;
pub mod json;
pub mod rss;

use std::error::Error;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use tracing::{info, instrument};
use url::Url;

use crate::cache::ArticleStore;
use crate::cache::persist::write_atomic;
use crate::config::FeedMeta;
use crate::models::Article;
use crate::utils::upcase;

/// Everything a feed renderer reads.
#[derive(Debug)]
pub struct FeedSnapshot<'a> {
    pub meta: &'a FeedMeta,
    /// Articles in feed order.
    pub articles: Vec<&'a Article>,
    /// Feed-level "last updated" timestamp.
    pub updated: DateTime<Utc>,
}

impl<'a> FeedSnapshot<'a> {
    /// Snapshot of `store`. A store that was never stamped shows `now`.
    pub fn new(store: &'a ArticleStore, meta: &'a FeedMeta, now: DateTime<Utc>) -> Self {
        Self {
            meta,
            articles: store.ordered(),
            updated: store.last_updated().unwrap_or(now),
        }
    }
}

/// Render every feed format and `last_update.txt` into `output_dir`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub fn write_feeds(snapshot: &FeedSnapshot<'_>, output_dir: &Path) -> Result<(), Box<dyn Error>> {
    let atom = atom::render(snapshot)?;
    write_atomic(&output_dir.join("feed.atom"), &atom)?;
    write_atomic(&output_dir.join("feed.xml"), &atom)?;

    let rss = rss::render(snapshot)?;
    write_atomic(&output_dir.join("rss.xml"), &rss)?;

    let json = json::render(snapshot)?;
    write_atomic(&output_dir.join("feed.json"), &json)?;

    let stamp = format!("Last updated: {}", rfc3339(snapshot.updated));
    write_atomic(&output_dir.join("last_update.txt"), stamp.as_bytes())?;

    info!(
        articles = snapshot.articles.len(),
        updated = %rfc3339(snapshot.updated),
        "Wrote feeds"
    );
    Ok(())
}

/// HTML body of a feed entry: the source line, then the stored fragment.
pub(crate) fn entry_html(article: &Article) -> String {
    let mut html = format!("<p>Source: {}</p>", escape(article.source.as_str()));
    if let Some(body) = &article.body {
        html.push_str(body);
    }
    html
}

/// Last time an entry changed: a corrected title counts as an update.
pub(crate) fn modified_date(article: &Article) -> DateTime<Utc> {
    article.updated_at.max(article.effective_date())
}

/// Human label for a source tag ("news" -> "News").
pub(crate) fn source_label(source: &str) -> String {
    upcase(source)
}

pub(crate) fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// URL of a file published next to the Atom feed (`feed.json`, `rss.xml`).
pub(crate) fn sibling_url(self_url: &str, file: &str) -> String {
    Url::parse(self_url)
        .and_then(|u| u.join(file))
        .map(String::from)
        .unwrap_or_else(|_| self_url.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::models::Article;

    pub fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    pub fn article(slug: &str, title: &str, source: &str, published: Option<u32>) -> Article {
        let url = format!("https://www.anthropic.com/{source}/{slug}");
        Article {
            id: url.clone(),
            title: title.to_string(),
            url,
            source: source.to_string(),
            published: published.map(day),
            first_seen: day(20),
            updated_at: day(20),
            body: None,
            extra: BTreeMap::new(),
        }
    }
}
