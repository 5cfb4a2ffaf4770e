//! Date parsing for scraped listings.

use chrono::{DateTime, NaiveDate, Utc};

/// Formats seen on the listing pages, tried in order.
const DATE_FORMATS: [&str; 3] = ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"];

/// Parse a date as shown on a listing page.
///
/// Accepts RFC 3339 timestamps (the `datetime` attribute of `<time>`) and the
/// human formats in [`DATE_FORMATS`], the latter at midnight UTC. Anything
/// else, including an empty string, gives `None`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}
