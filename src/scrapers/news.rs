//! News listing layout.
//!
//! Every article on the page is an anchor pointing at `/news/<slug>` that
//! wraps a heading and, usually, a `<time>` element. Navigation links to the
//! same paths carry no heading and are skipped.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{element_date, element_text, resolve_url};
use crate::models::ScrapedArticle;

static ARTICLE_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^='/news/']").expect("valid news link selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3, h2").expect("valid title selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("valid time selector"));
static TEASER: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid teaser selector"));

/// Extract news articles from the listing page.
pub fn parse_news_page(html: &str, base: &Url) -> Vec<ScrapedArticle> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for link in document.select(&ARTICLE_LINKS) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(title) = link.select(&TITLE).next().map(element_text) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let Some(url) = resolve_url(base, href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let published = link.select(&TIME).next().and_then(element_date);
        let body = link
            .select(&TEASER)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .map(|text| format!("<p>{}</p>", escape(text.as_str())));

        articles.push(ScrapedArticle {
            id: None,
            title,
            url,
            published,
            body,
        });
    }

    debug!(count = articles.len(), "Parsed news listing");
    articles
}
