//! Atom 1.0 writer.

use std::error::Error;
use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{FeedSnapshot, entry_html, modified_date, rfc3339, source_label};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

pub fn render(snapshot: &FeedSnapshot<'_>) -> Result<Vec<u8>, Box<dyn Error>> {
    let meta = snapshot.meta;
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    feed.push_attribute(("xml:lang", meta.language.as_str()));
    w.write_event(Event::Start(feed))?;

    text_element(&mut w, "id", &meta.id)?;
    text_element(&mut w, "title", &meta.title)?;
    text_element(&mut w, "updated", &rfc3339(snapshot.updated))?;
    w.write_event(Event::Start(BytesStart::new("author")))?;
    text_element(&mut w, "name", &meta.author)?;
    w.write_event(Event::End(BytesEnd::new("author")))?;
    link(&mut w, &meta.self_url, "self")?;
    link(&mut w, &meta.site_url, "alternate")?;
    text_element(&mut w, "generator", env!("CARGO_PKG_NAME"))?;

    for article in &snapshot.articles {
        w.write_event(Event::Start(BytesStart::new("entry")))?;
        text_element(&mut w, "id", &article.id)?;
        text_element(&mut w, "title", &article.title)?;
        text_element(&mut w, "updated", &rfc3339(modified_date(article)))?;
        text_element(&mut w, "published", &rfc3339(article.effective_date()))?;
        link(&mut w, &article.url, "alternate")?;

        let mut content = BytesStart::new("content");
        content.push_attribute(("type", "html"));
        w.write_event(Event::Start(content))?;
        w.write_event(Event::Text(BytesText::new(&entry_html(article))))?;
        w.write_event(Event::End(BytesEnd::new("content")))?;

        if !article.source.is_empty() {
            let label = source_label(&article.source);
            let mut category = BytesStart::new("category");
            category.push_attribute(("term", article.source.as_str()));
            category.push_attribute(("label", label.as_str()));
            w.write_event(Event::Empty(category))?;
        }
        w.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    w.write_event(Event::End(BytesEnd::new("feed")))?;
    let mut out = w.into_inner();
    out.write_all(b"\n")?;
    Ok(out)
}

fn text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<(), Box<dyn Error>> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn link<W: Write>(w: &mut Writer<W>, href: &str, rel: &str) -> Result<(), Box<dyn Error>> {
    let mut el = BytesStart::new("link");
    el.push_attribute(("href", href));
    el.push_attribute(("rel", rel));
    w.write_event(Event::Empty(el))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedMeta;
    use crate::outputs::test_support::{article, day};

    fn rendered() -> String {
        let meta = FeedMeta::default();
        let mut with_body = article("constitution", "Claude's new constitution & you", "news", Some(3));
        with_body.body = Some("<p>Teaser</p>".to_string());
        let undated = article("undated", "Undated", "research", None);
        let older = article("older", "Older", "news", Some(1));
        let snapshot = FeedSnapshot {
            meta: &meta,
            articles: vec![&undated, &with_body, &older],
            updated: day(21),
        };
        String::from_utf8(render(&snapshot).unwrap()).unwrap()
    }

    #[test]
    fn test_feed_header() {
        let xml = rendered();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\" xml:lang=\"en\">"));
        assert!(xml.contains("<id>anthropic-feed</id>"));
        assert!(xml.contains("<updated>2024-01-21T00:00:00Z</updated>"));
        assert!(xml.contains("<link href=\"https://kelp.github.io/llm-news/feed.atom\" rel=\"self\"/>"));
    }

    #[test]
    fn test_entries_escaped_and_categorized() {
        let xml = rendered();
        assert!(xml.contains("new constitution &amp; you</title>"));
        assert!(xml.contains("&lt;p&gt;Source: news&lt;/p&gt;&lt;p&gt;Teaser&lt;/p&gt;"));
        assert!(xml.contains("<category term=\"research\" label=\"Research\"/>"));
        assert!(xml.contains("<published>2024-01-20T00:00:00Z</published>"));
    }

    #[test]
    fn test_entry_updated_tracks_later_edits() {
        let xml = rendered();
        let entry = &xml[xml.find("news/constitution").unwrap()..];
        let entry = &entry[..entry.find("</entry>").unwrap()];
        assert!(entry.contains("<updated>2024-01-20T00:00:00Z</updated>"));
        assert!(entry.contains("<published>2024-01-03T00:00:00Z</published>"));
    }

    #[test]
    fn test_entries_keep_snapshot_order() {
        let xml = rendered();
        let undated = xml.find("research/undated").unwrap();
        let constitution = xml.find("news/constitution").unwrap();
        let older = xml.find("news/older").unwrap();
        assert!(undated < constitution && constitution < older);
    }
}
