use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Layouts with an explicit offset that are not valid RFC 2822 / RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%a, %d %b %Y %H:%M:%S%.f %z",
];

/// Layouts without an offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
];

/// Best-effort conversion of a feed-supplied publish date.
///
/// Tries RFC 2822 (the RSS standard, including obsolete zone names such as
/// `GMT` or `EST`), then RFC 3339, then a handful of common non-conforming
/// layouts. A weekday that does not match the date is ignored. Anything
/// unrecognised yields `None`, never an error.
///
/// ```
/// use gator::feed::parse_published;
///
/// assert!(parse_published("Mon, 02 Jan 2006 15:04:05 GMT").is_some());
/// assert!(parse_published("2006-01-02T15:04:05Z").is_some());
/// assert!(parse_published("last Tuesday").is_none());
/// ```
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    parse_with_offset(s)
        .or_else(|| strip_weekday(s).and_then(parse_with_offset))
        .or_else(|| parse_naive(s))
        .or_else(|| strip_weekday(s).and_then(parse_naive))
}

fn parse_with_offset(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(s: &str) -> Option<DateTime<Utc>> {
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `"Tue, 02 Jan 2006 …"` → `"02 Jan 2006 …"`. Feeds often get the weekday wrong.
fn strip_weekday(s: &str) -> Option<&str> {
    let (head, rest) = s.split_once(',')?;
    if head.len() >= 3 && head.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(rest.trim_start())
    } else {
        None
    }
}
