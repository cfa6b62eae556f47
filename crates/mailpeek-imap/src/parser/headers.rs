//! Header field extraction from a raw `HEADER.FIELDS` block.

use std::sync::LazyLock;

use regex::Regex;

static FROM: LazyLock<Regex> = LazyLock::new(|| field_regex("from"));
static SUBJECT: LazyLock<Regex> = LazyLock::new(|| field_regex("subject"));
static DATE: LazyLock<Regex> = LazyLock::new(|| field_regex("date"));
static CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| folded_field_regex("content-type"));
static TRANSFER_ENCODING: LazyLock<Regex> =
    LazyLock::new(|| folded_field_regex("content-transfer-encoding"));

#[allow(clippy::expect_used)]
fn field_regex(name: &str) -> Regex {
    Regex::new(&format!(r"(?im)^{name}:[ \t]*([^\r\n]*)")).expect("static header regex")
}

#[allow(clippy::expect_used)]
fn folded_field_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r"(?im)^{name}:[ \t]*([^\r\n]*(?:\r?\n[ \t]+[^\r\n]*)*)"
    ))
    .expect("static header regex")
}

/// Header fields of one message.
///
/// `From`, `Subject` and `Date` keep only the first physical line of a
/// folded header. `Content-Type` and `Content-Transfer-Encoding` are
/// unfolded because the boundary parameter usually sits on a continuation
/// line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    /// Raw `From` value.
    pub from: Option<String>,
    /// Raw (still encoded) `Subject` value.
    pub subject: Option<String>,
    /// Raw `Date` value.
    pub date: Option<String>,
    /// Unfolded `Content-Type` value.
    pub content_type: Option<String>,
    /// `Content-Transfer-Encoding` value.
    pub transfer_encoding: Option<String>,
}

impl HeaderFields {
    /// Extracts the known fields from a raw header block.
    ///
    /// Matching is case-insensitive and stops at the first blank line.
    #[must_use]
    pub fn extract(raw: &str) -> Self {
        let block = header_block(raw);
        Self {
            from: capture(&FROM, block),
            subject: capture(&SUBJECT, block),
            date: capture(&DATE, block),
            content_type: capture(&CONTENT_TYPE, block).map(|v| unfold(&v)),
            transfer_encoding: capture(&TRANSFER_ENCODING, block).map(|v| unfold(&v)),
        }
    }
}

/// Returns everything before the first blank line.
fn header_block(raw: &str) -> &str {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            return &raw[..offset];
        }
        offset += line.len();
    }
    raw
}

fn capture(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn unfold(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic_fields() {
        let raw = "From: Alice <alice@example.com>\r\nSubject: Hello\r\nDate: Tue, 1 Jul 2025 10:00:00 +0000\r\n\r\n";
        let fields = HeaderFields::extract(raw);

        assert_eq!(fields.from.as_deref(), Some("Alice <alice@example.com>"));
        assert_eq!(fields.subject.as_deref(), Some("Hello"));
        assert_eq!(
            fields.date.as_deref(),
            Some("Tue, 1 Jul 2025 10:00:00 +0000")
        );
        assert_eq!(fields.content_type, None);
    }

    #[test]
    fn test_case_insensitive() {
        let fields = HeaderFields::extract("SUBJECT: Shouting\r\nfrom: bob@example.com\r\n");
        assert_eq!(fields.subject.as_deref(), Some("Shouting"));
        assert_eq!(fields.from.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_folded_subject_keeps_first_line() {
        let raw = "Subject: A very long subject\r\n that continues here\r\n\r\n";
        let fields = HeaderFields::extract(raw);
        assert_eq!(fields.subject.as_deref(), Some("A very long subject"));
    }

    #[test]
    fn test_folded_content_type_is_unfolded() {
        let raw = "Content-Type: multipart/alternative;\r\n\tboundary=\"b1\"\r\nContent-Transfer-Encoding: 7bit\r\n\r\n";
        let fields = HeaderFields::extract(raw);
        assert_eq!(
            fields.content_type.as_deref(),
            Some("multipart/alternative; boundary=\"b1\"")
        );
        assert_eq!(fields.transfer_encoding.as_deref(), Some("7bit"));
    }

    #[test]
    fn test_stops_at_blank_line() {
        let raw = "Subject: Real\r\n\r\nSubject: Not a header\r\n";
        let fields = HeaderFields::extract(raw);
        assert_eq!(fields.subject.as_deref(), Some("Real"));
        assert_eq!(fields.from, None);
    }

    #[test]
    fn test_field_name_must_start_line() {
        let fields = HeaderFields::extract("X-Original-From: someone\r\n");
        assert_eq!(fields.from, None);
    }

    #[test]
    fn test_empty_value() {
        let fields = HeaderFields::extract("Subject:\r\n");
        assert_eq!(fields.subject.as_deref(), Some(""));
    }
}
