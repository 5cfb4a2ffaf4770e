//! JSON Feed 1.1 writer.
//!
//! See <https://www.jsonfeed.org/version/1.1/>. Items mirror the Atom entries:
//! same identity, same HTML content, the source tag as the only tag.

use std::error::Error;

use serde::Serialize;

use super::{FeedSnapshot, entry_html, modified_date, rfc3339, sibling_url};

const VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Debug, Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    language: &'a str,
    authors: Vec<Author<'a>>,
    items: Vec<Item<'a>>,
}

#[derive(Debug, Serialize)]
struct Author<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Item<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: String,
    date_published: String,
    date_modified: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}

pub fn render(snapshot: &FeedSnapshot<'_>) -> Result<Vec<u8>, Box<dyn Error>> {
    let meta = snapshot.meta;
    let feed = JsonFeed {
        version: VERSION,
        title: &meta.title,
        home_page_url: &meta.site_url,
        feed_url: sibling_url(&meta.self_url, "feed.json"),
        language: &meta.language,
        authors: vec![Author { name: &meta.author }],
        items: snapshot
            .articles
            .iter()
            .map(|article| Item {
                id: &article.id,
                url: &article.url,
                title: &article.title,
                content_html: entry_html(article),
                date_published: rfc3339(article.effective_date()),
                date_modified: rfc3339(modified_date(article)),
                tags: if article.source.is_empty() {
                    vec![]
                } else {
                    vec![article.source.as_str()]
                },
            })
            .collect(),
    };

    let mut out = serde_json::to_vec_pretty(&feed)?;
    out.push(b'\n');
    Ok(out)
}
