//! Public message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mailpeek_imap::ParsedMessage;
use mailpeek_mime::{decode_encoded_words, extract_text, parse_date, preview, sanitize_body};

/// Subject used when the header is missing or decodes to nothing.
pub const NO_SUBJECT: &str = "(No subject)";

/// Display name used when the message has no `From` header at all.
pub const UNKNOWN_SENDER: &str = "(unknown sender)";

/// One retrieved message, ready to hand to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    /// UID as a string.
    pub id: String,
    /// Mailbox-stable unique identifier.
    pub uid: u32,
    /// Sequence number at fetch time.
    pub seq: u32,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    pub from_name: String,
    /// Decoded subject, never empty.
    pub subject: String,
    /// Send time; the retrieval time when the header is unusable.
    pub date: DateTime<Utc>,
    /// Short preview of the body.
    pub preview: String,
    /// Full sanitized body.
    pub body: String,
    /// Whether `\Seen` was set.
    pub is_read: bool,
}

impl EmailRecord {
    /// Builds a record from a parsed message.
    ///
    /// `now` stands in for a missing or unparsable `Date` header.
    #[must_use]
    pub fn from_parsed(message: ParsedMessage, now: DateTime<Utc>) -> Self {
        let headers = &message.headers;
        let (from_address, from_name) = parse_sender(headers.from.as_deref());

        let subject = headers
            .subject
            .as_deref()
            .map(decode_encoded_words)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NO_SUBJECT.to_string());

        let date = headers
            .date
            .as_deref()
            .and_then(parse_date)
            .unwrap_or(now);

        let text = extract_text(
            &message.body,
            headers.content_type.as_deref(),
            headers.transfer_encoding.as_deref(),
        );
        let body = sanitize_body(&text);

        Self {
            id: message.uid.to_string(),
            uid: message.uid,
            seq: message.seq,
            from_address,
            from_name,
            subject,
            date,
            preview: preview(&body),
            body,
            is_read: message.seen,
        }
    }
}

/// Splits a `From` value into `(address, display name)`.
///
/// `Name <addr>` yields both parts; a value without angle brackets is used
/// as both address and name.
#[must_use]
pub fn parse_sender(raw: Option<&str>) -> (String, String) {
    let Some(raw) = raw else {
        return (String::new(), UNKNOWN_SENDER.to_string());
    };
    let decoded = decode_encoded_words(raw);

    if let Some(open) = decoded.rfind('<')
        && let Some(len) = decoded[open + 1..].find('>')
    {
        let address = decoded[open + 1..open + 1 + len].trim().to_string();
        let name = decoded[..open].trim().trim_matches('"').trim().to_string();
        let name = if name.is_empty() { address.clone() } else { name };
        return (address, name);
    }

    (decoded.clone(), decoded)
}

/// Sorts newest first. Records with equal dates keep their order.
pub fn sort_newest_first(records: &mut [EmailRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date));
}
