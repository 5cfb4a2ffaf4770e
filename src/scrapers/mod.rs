//! Page extractors.
//!
//! Turns a downloaded listing page into [`ScrapedArticle`]s. Extraction is a
//! pure function of the page content and the [`Source`] it came from; the
//! orchestrator only calls it when the server returned new content.
//!
//! # Supported layouts
//!
//! | Layout | Module | What is read |
//! |--------|--------|--------------|
//! | News | [`news`] | `/news/...` links with a heading and `<time>` |
//! | Research | [`research`] | publication cards, then outbound paper links |

pub mod dates;
pub mod news;
pub mod research;

use scraper::ElementRef;
use tracing::{info, instrument};
use url::Url;

use crate::error::ExtractionError;
use crate::models::{ScrapedArticle, Source, SourceLayout};

/// Extracts articles from a page body.
pub trait Extractor {
    fn extract(&self, html: &str, source: &Source) -> Result<Vec<ScrapedArticle>, ExtractionError>;
}

/// Extractor dispatching on [`Source::layout`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutExtractor;

impl Extractor for LayoutExtractor {
    #[instrument(level = "info", skip_all, fields(source = %source.id, bytes = html.len()))]
    fn extract(&self, html: &str, source: &Source) -> Result<Vec<ScrapedArticle>, ExtractionError> {
        let base = Url::parse(source.base_url()).map_err(|e| ExtractionError::Malformed {
            source_id: source.id.clone(),
            reason: format!("invalid base URL {}: {e}", source.base_url()),
        })?;

        let articles = match source.layout {
            SourceLayout::News => news::parse_news_page(html, &base),
            SourceLayout::Research => research::parse_research_page(html, &base),
        };

        if articles.is_empty() {
            return Err(ExtractionError::NoArticles(source.id.clone()));
        }
        info!(count = articles.len(), "Extracted articles");
        Ok(articles)
    }
}

/// Visible text of an element, whitespace-trimmed pieces joined by one space.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page base. Only http(s) results are kept.
pub(crate) fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Date carried by a `<time>`-like element: `datetime` attribute first, then text.
pub(crate) fn element_date(element: ElementRef<'_>) -> Option<chrono::DateTime<chrono::Utc>> {
    element
        .value()
        .attr("datetime")
        .and_then(dates::parse_date)
        .or_else(|| dates::parse_date(&element_text(element)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(layout: SourceLayout) -> Source {
        Source {
            id: "news".to_string(),
            url: "https://www.anthropic.com/news".to_string(),
            layout,
            base_url: None,
        }
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://www.anthropic.com/news").unwrap();
        assert_eq!(
            resolve_url(&base, "/news/claude-3-family").as_deref(),
            Some("https://www.anthropic.com/news/claude-3-family")
        );
        assert_eq!(resolve_url(&base, "mailto:press@anthropic.com"), None);
    }

    #[test]
    fn test_empty_page_is_extraction_failure() {
        let result = LayoutExtractor.extract("<html><body><p>Maintenance</p></body></html>", &source(SourceLayout::News));
        assert!(matches!(result, Err(ExtractionError::NoArticles(id)) if id == "news"));
    }

    #[test]
    fn test_invalid_base_url_is_malformed() {
        let mut bad = source(SourceLayout::News);
        bad.base_url = Some("not a url".to_string());
        let result = LayoutExtractor.extract("<html></html>", &bad);
        assert!(matches!(result, Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn test_dispatches_on_layout() {
        let html = r#"<a href="/news/x"><h3>Introducing X</h3><time>Mar 4, 2024</time></a>"#;
        let articles = LayoutExtractor.extract(html, &source(SourceLayout::News)).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://www.anthropic.com/news/x");
    }
}
