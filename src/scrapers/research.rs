//! Research listing layout.
//!
//! The research page is less regular than the news page and many entries
//! point off-site (arXiv, transformer-circuits.pub, PDFs). Three passes run in
//! order, later ones adding only URLs not already found:
//!
//! 1. publication / research cards with a heading and a link
//! 2. outbound paper links anywhere on the page, with a title recovered from
//!    nearby headings or text when the link text is too generic
//! 3. only if nothing was found: any link inside a block mentioning
//!    "Research" or "Publications"

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{element_date, element_text, resolve_url};
use crate::models::ScrapedArticle;
use crate::utils::upcase;

const TITLE_PREFIX: &str = "Anthropic Research";

/// Link words that mark site chrome rather than papers.
const NAV_WORDS: [&str; 7] = ["privacy", "terms", "contact", "about", "login", "sign", "home"];
const SECTION_NAV_WORDS: [&str; 4] = ["privacy", "terms", "contact", "about"];
const GENERIC_LINK_TEXT: [&str; 5] = ["read paper", "pdf", "arxiv", "link", "read more"];

static CARDS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "div.publication-card, div.research-card, div[class*='publication'], div[class*='research']",
    )
    .expect("valid card selector")
});
static LOOSE_CARDS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[id*='publication'], [class*='publication'], [id*='paper'], [class*='paper']")
        .expect("valid loose card selector")
});
static CARD_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, strong, b").expect("valid card title selector"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static DATE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("time, span[class*='date'], div[class*='date']").expect("valid date selector")
});
static PAPER_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href*='arxiv.org'], a[href*='transformer-circuits'], a[href*='.pdf'], a[href*='paper']")
        .expect("valid paper link selector")
});
static HEADINGS: Lazy<[Selector; 3]> = Lazy::new(|| {
    ["h2", "h3", "h4"].map(|tag| Selector::parse(tag).expect("valid heading selector"))
});
static SECTIONS: Lazy<Selector> = Lazy::new(|| Selector::parse("div, section").expect("valid section selector"));
static ARXIV_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\d+)").expect("valid arXiv id pattern"));

/// Extract research entries from the listing page.
pub fn parse_research_page(html: &str, base: &Url) -> Vec<ScrapedArticle> {
    let document = Html::parse_document(html);
    let mut collected = Collected::default();

    let cards: Vec<ElementRef<'_>> = {
        let strict: Vec<_> = document.select(&CARDS).collect();
        if strict.is_empty() {
            document.select(&LOOSE_CARDS).collect()
        } else {
            strict
        }
    };
    for card in cards {
        collect_card(card, base, &mut collected);
    }
    debug!(count = collected.articles.len(), "Research cards pass");

    for link in document.select(&PAPER_LINKS) {
        collect_paper_link(link, base, &mut collected);
    }
    debug!(count = collected.articles.len(), "Research paper link pass");

    if collected.articles.is_empty() {
        for section in document.select(&SECTIONS) {
            let text = element_text(section);
            if text.contains("Research") || text.contains("Publications") {
                collect_section_links(section, base, &mut collected);
            }
        }
        debug!(count = collected.articles.len(), "Research section fallback pass");
    }

    collected.articles
}

#[derive(Default)]
struct Collected {
    seen: HashSet<String>,
    articles: Vec<ScrapedArticle>,
}

impl Collected {
    fn push(&mut self, title: String, url: String, published: Option<chrono::DateTime<chrono::Utc>>) {
        if title.is_empty() || !self.seen.insert(url.clone()) {
            return;
        }
        self.articles.push(ScrapedArticle {
            id: None,
            title,
            url,
            published,
            body: None,
        });
    }
}

fn collect_card(card: ElementRef<'_>, base: &Url, collected: &mut Collected) {
    let (Some(title_el), Some(link)) = (card.select(&CARD_TITLE).next(), card.select(&ANY_LINK).next()) else {
        return;
    };
    let Some(url) = link.value().attr("href").and_then(|href| resolve_url(base, href)) else {
        return;
    };
    let published = card.select(&DATE).next().and_then(element_date);
    collected.push(element_text(title_el), url, published);
}

fn collect_paper_link(link: ElementRef<'_>, base: &Url, collected: &mut Collected) {
    let Some(href) = link.value().attr("href") else {
        return;
    };
    if contains_any(href, &NAV_WORDS) {
        return;
    }
    let Some(url) = resolve_url(base, href) else {
        return;
    };

    let mut title = element_text(link);
    if is_generic_link_text(&title) {
        if let Some(better) = title_from_surroundings(link) {
            title = better;
        }
    }
    if title.chars().count() < 10 {
        if let Some(synth) = synthesize_title(&url) {
            title = synth;
        }
    }

    let published = link
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(2)
        .find_map(|near| near.select(&DATE).next())
        .and_then(element_date);

    collected.push(title, url, published);
}

fn collect_section_links(section: ElementRef<'_>, base: &Url, collected: &mut Collected) {
    for link in section.select(&ANY_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || contains_any(href, &SECTION_NAV_WORDS) {
            continue;
        }
        let title = element_text(link);
        if title.chars().count() < 10 {
            continue;
        }
        if let Some(url) = resolve_url(base, href) {
            collected.push(title, url, None);
        }
    }
}

fn contains_any(href: &str, words: &[&str]) -> bool {
    let lower = href.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

fn is_generic_link_text(text: &str) -> bool {
    text.is_empty()
        || text.chars().count() < 15
        || GENERIC_LINK_TEXT.contains(&text.to_lowercase().as_str())
}

/// Look up to three ancestors for a heading, or for a parent whose whole text
/// is short enough to be a title.
fn title_from_surroundings(link: ElementRef<'_>) -> Option<String> {
    for parent in link.ancestors().filter_map(ElementRef::wrap).take(3) {
        if let Some(heading) = HEADINGS.iter().find_map(|sel| parent.select(sel).next()) {
            return Some(element_text(heading));
        }
        let text = element_text(parent);
        let len = text.chars().count();
        if len > 20 && len < 200 {
            return Some(text);
        }
    }
    None
}

/// Title built from the URL when the page offers nothing readable.
fn synthesize_title(url: &str) -> Option<String> {
    if url.contains("arxiv") {
        return ARXIV_ID
            .captures(url)
            .map(|caps| format!("{TITLE_PREFIX} Paper (arXiv:{})", &caps[1]));
    }

    let parsed = Url::parse(url).ok()?;
    let last = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or_default();
    let words = last.replace(['-', '_'], " ");
    let words = words.trim();
    if words.is_empty() {
        return Some(format!("{TITLE_PREFIX} Paper"));
    }
    let titled = words
        .split_whitespace()
        .map(|w| upcase(&w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ");
    Some(format!("{TITLE_PREFIX}: {titled}"))
}
