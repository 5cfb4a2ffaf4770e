//! RSS 2.0 writer.

use std::error::Error;
use std::io::Write;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{FeedSnapshot, entry_html, sibling_url};

pub fn render(snapshot: &FeedSnapshot<'_>) -> Result<Vec<u8>, Box<dyn Error>> {
    let meta = snapshot.meta;
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
    w.write_event(Event::Start(rss))?;
    w.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut w, "title", &meta.title)?;
    text_element(&mut w, "link", &meta.site_url)?;
    text_element(&mut w, "description", &meta.title)?;
    text_element(&mut w, "language", &meta.language)?;
    text_element(&mut w, "lastBuildDate", &rfc2822(snapshot.updated))?;
    let self_url = sibling_url(&meta.self_url, "rss.xml");
    let mut atom_link = BytesStart::new("atom:link");
    atom_link.push_attribute(("href", self_url.as_str()));
    atom_link.push_attribute(("rel", "self"));
    atom_link.push_attribute(("type", "application/rss+xml"));
    w.write_event(Event::Empty(atom_link))?;

    for article in &snapshot.articles {
        w.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut w, "title", &article.title)?;
        text_element(&mut w, "link", &article.url)?;

        let permalink = if article.id == article.url { "true" } else { "false" };
        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", permalink));
        w.write_event(Event::Start(guid))?;
        w.write_event(Event::Text(BytesText::new(&article.id)))?;
        w.write_event(Event::End(BytesEnd::new("guid")))?;

        text_element(&mut w, "pubDate", &rfc2822(article.effective_date()))?;
        text_element(&mut w, "description", &entry_html(article))?;
        if !article.source.is_empty() {
            text_element(&mut w, "category", &article.source)?;
        }
        w.write_event(Event::End(BytesEnd::new("item")))?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))?;
    w.write_event(Event::End(BytesEnd::new("rss")))?;
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

fn rfc2822(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedMeta;
    use crate::outputs::test_support::{article, day};

    #[test]
    fn test_rfc2822() {
        assert_eq!(rfc2822(day(2)), "Tue, 02 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_channel_and_items() {
        let meta = FeedMeta::default();
        let mut paper = article("paper", "Sleeper Agents", "research", Some(2));
        paper.id = "paper-42".to_string();
        let news = article("claude", "Claude", "news", Some(1));
        let snapshot = FeedSnapshot {
            meta: &meta,
            articles: vec![&paper, &news],
            updated: day(3),
        };

        let xml = String::from_utf8(render(&snapshot).unwrap()).unwrap();

        assert!(xml.contains("<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">"));
        assert!(xml.contains("<lastBuildDate>Wed, 03 Jan 2024 00:00:00 GMT</lastBuildDate>"));
        assert!(xml.contains("href=\"https://kelp.github.io/llm-news/rss.xml\""));
        assert!(xml.contains("<guid isPermaLink=\"false\">paper-42</guid>"));
        assert!(xml.contains("<guid isPermaLink=\"true\">https://www.anthropic.com/news/claude</guid>"));
        assert!(xml.contains("<pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate>"));
        assert!(xml.contains("<category>research</category>"));
        assert!(xml.find("Sleeper Agents").unwrap() < xml.find("<title>Claude</title>").unwrap());
    }
}
