//! Multipart body selection.
//!
//! Picks the most readable textual part out of a raw message body. The
//! first `text/plain` part wins; the first `text/html` part is the
//! fallback; anything else leaves the raw body unchanged.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::encoding::{bytes_to_text, decode_base64};

/// Nested multipart levels searched before giving up.
const MAX_DEPTH: usize = 8;

#[allow(clippy::expect_used)]
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary\s*=\s*(?:"([^"]+)"|([^\s;"]+))"#).expect("static regex")
});

#[allow(clippy::expect_used)]
static CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*"?([^"\s;]+)"?"#).expect("static regex")
});

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

/// Returns the multipart boundary declared in a header value or body.
#[must_use]
pub fn find_boundary(text: &str) -> Option<String> {
    BOUNDARY.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}

fn find_charset(content_type: &str) -> Option<&str> {
    CHARSET
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// One part of a multipart body, split at its first blank line.
#[derive(Debug, Clone, Copy)]
struct Part<'a> {
    headers: &'a str,
    content: &'a str,
}

impl<'a> Part<'a> {
    fn split(raw: &'a str) -> Self {
        let mut offset = 0;
        for line in raw.split_inclusive('\n') {
            offset += line.len();
            if line.trim_end_matches(['\r', '\n']).is_empty() {
                return Self {
                    headers: &raw[..offset - line.len()],
                    content: &raw[offset..],
                };
            }
        }
        Self {
            headers: "",
            content: raw,
        }
    }

    fn header(&self, name: &str) -> Option<String> {
        let mut value: Option<String> = None;
        for line in self.headers.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some(v) = value.as_mut() {
                    v.push(' ');
                    v.push_str(line.trim());
                }
                continue;
            }
            if value.is_some() {
                break;
            }
            if let Some((field, rest)) = line.split_once(':')
                && field.trim().eq_ignore_ascii_case(name)
            {
                value = Some(rest.trim().to_string());
            }
        }
        value
    }

    /// Parts without a `Content-Type` are `text/plain` (RFC 2045).
    fn content_type(&self) -> String {
        self.header("content-type")
            .unwrap_or_else(|| "text/plain".to_string())
    }

    fn transfer_encoding(&self) -> TransferEncoding {
        self.header("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, |v| TransferEncoding::parse(&v))
    }
}

/// Text chosen from a multipart tree.
enum Selected {
    Plain(String),
    Html(String),
}

/// Splits a body on `--boundary` delimiter lines.
///
/// The preamble before the first delimiter is skipped and the closing
/// `--boundary--` line ends the scan.
fn split_parts<'a>(raw: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix(delimiter.as_str())
            && (rest.is_empty() || rest == "--")
        {
            if let Some(s) = start {
                parts.push(trim_line_ending(&raw[s..offset]));
            }
            if rest == "--" {
                return parts;
            }
            start = Some(offset + line.len());
        }
        offset += line.len();
    }

    // Unterminated multipart: keep the last open part.
    if let Some(s) = start {
        parts.push(&raw[s..]);
    }
    parts
}

/// The CRLF before a delimiter belongs to the delimiter.
fn trim_line_ending(part: &str) -> &str {
    part.strip_suffix("\r\n")
        .or_else(|| part.strip_suffix('\n'))
        .unwrap_or(part)
}

fn decode_part(part: &Part<'_>, content_type: &str) -> String {
    match part.transfer_encoding() {
        TransferEncoding::Base64 => {
            decode_base64_text(part.content, find_charset(content_type).unwrap_or("utf-8"))
                .unwrap_or_else(|| part.content.to_string())
        }
        _ => part.content.to_string(),
    }
}

fn decode_base64_text(content: &str, charset: &str) -> Option<String> {
    let bytes = decode_base64(content)
        .inspect_err(|e| debug!(error = %e, "base64 part left undecoded"))
        .ok()?;
    Some(bytes_to_text(bytes.clone(), charset).unwrap_or_else(|_| {
        String::from_utf8_lossy(&bytes).into_owned()
    }))
}

fn search(raw: &str, boundary: &str, depth: usize) -> Option<Selected> {
    let mut html = None;

    for raw_part in split_parts(raw, boundary) {
        let part = Part::split(raw_part);
        let content_type = part.content_type();
        let lowered = content_type.to_ascii_lowercase();

        if lowered.starts_with("multipart/") {
            if depth >= MAX_DEPTH {
                continue;
            }
            let Some(inner) = find_boundary(&content_type) else {
                continue;
            };
            match search(part.content, &inner, depth + 1) {
                Some(Selected::Plain(text)) => return Some(Selected::Plain(text)),
                Some(Selected::Html(text)) => {
                    html.get_or_insert(text);
                }
                None => {}
            }
        } else if lowered.starts_with("text/plain") {
            return Some(Selected::Plain(decode_part(&part, &content_type)));
        } else if lowered.starts_with("text/html") && html.is_none() {
            html = Some(decode_part(&part, &content_type));
        }
    }

    html.map(Selected::Html)
}

/// Selects the best textual part of a raw body.
///
/// The boundary comes from the message's `Content-Type` header when it is
/// known, otherwise from a `boundary=` declaration inside the body. Without
/// a boundary, or without any textual part, the raw body is returned
/// unchanged.
#[must_use]
pub fn select_body_part(raw: &str, content_type: Option<&str>) -> String {
    let boundary = content_type
        .and_then(find_boundary)
        .or_else(|| find_boundary(raw));

    let Some(boundary) = boundary else {
        return raw.to_string();
    };

    match search(raw, &boundary, 0) {
        Some(Selected::Plain(text) | Selected::Html(text)) => text,
        None => raw.to_string(),
    }
}

/// Extracts readable text from a raw message body.
///
/// Multipart bodies go through [`select_body_part`]. A single-part body
/// declared as base64 is decoded; any other body is returned as is.
#[must_use]
pub fn extract_text(raw: &str, content_type: Option<&str>, transfer_encoding: Option<&str>) -> String {
    let is_multipart = content_type
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"));

    if is_multipart || find_boundary(raw).is_some() {
        return select_body_part(raw, content_type);
    }

    if transfer_encoding.map(TransferEncoding::parse) == Some(TransferEncoding::Base64) {
        let charset = content_type.and_then(find_charset).unwrap_or("utf-8");
        if let Some(text) = decode_base64_text(raw, charset) {
            return text;
        }
    }

    raw.to_string()
}
