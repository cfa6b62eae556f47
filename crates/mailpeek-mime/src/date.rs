//! `Date` header parsing.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Formats tried after strict RFC 2822 parsing fails.
const FALLBACK_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
];

/// Parses an RFC 2822 `Date` header value into UTC.
///
/// Trailing comments such as `(UTC)` or `(PDT)` are dropped before
/// parsing, as are `GMT`/`UT` zone names that some servers append after
/// a numeric offset. Returns `None` when nothing matches.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_comment(value.trim());
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    let cleaned = cleaned
        .trim_end_matches(" GMT")
        .trim_end_matches(" UT")
        .trim();
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(cleaned, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(cleaned, "%a, %d %b %Y %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn strip_comment(value: &str) -> &str {
    match value.find('(') {
        Some(pos) if value.ends_with(')') => value[..pos].trim_end(),
        _ => value,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2822() {
        let dt = parse_date("Tue, 1 Jul 2025 10:00:00 +0200").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-07-01T08:00:00+00:00");
    }

    #[test]
    fn test_trailing_comment() {
        let dt = parse_date("Wed, 02 Jul 2025 09:30:00 -0700 (PDT)").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-07-02T16:30:00+00:00");
    }

    #[test]
    fn test_without_weekday() {
        assert!(parse_date("2 Jul 2025 09:30:00 +0000").is_some());
    }

    #[test]
    fn test_offset_followed_by_zone_name() {
        let dt = parse_date("Thu, 03 Jul 2025 12:00:00 +0000 GMT").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-07-03T12:00:00+00:00");
    }

    #[test]
    fn test_missing_zone_is_utc() {
        let dt = parse_date("Thu, 03 Jul 2025 12:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-07-03T12:00:00+00:00");
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
    }
}
