//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded header words.
//! Everything here is lenient: malformed input degrades to the original
//! text instead of failing the whole header or body.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use regex::Regex;
use tracing::trace;

use crate::error::{Error, Result};

/// `=?charset?B|Q?text?=`
#[allow(clippy::expect_used)]
static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").expect("static regex")
});

/// Decodes Base64 data, ignoring embedded whitespace and missing padding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(&cleaned) {
        Ok(bytes) => Ok(bytes),
        Err(_) => STANDARD_NO_PAD
            .decode(cleaned.trim_end_matches('='))
            .map_err(Into::into),
    }
}

/// Removes quoted-printable soft line breaks (`=` at end of line).
#[must_use]
pub fn remove_soft_breaks(text: &str) -> String {
    text.replace("=\r\n", "").replace("=\n", "")
}

/// Decodes quoted-printable text (RFC 2045) into raw bytes.
///
/// Soft line breaks are removed first, then every valid `=XX` escape
/// becomes its byte. Invalid escapes are kept verbatim.
#[must_use]
pub fn decode_quoted_printable(text: &str) -> Vec<u8> {
    let text = remove_soft_breaks(text);
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'='
            && let Some(byte) = hex_pair(bytes.get(i + 1..i + 3))
        {
            result.push(byte);
            i += 3;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }

    result
}

/// Decodes quoted-printable text, mapping each escape to a Latin-1 char.
///
/// Used when the escaped bytes do not form valid UTF-8.
#[must_use]
pub fn decode_quoted_printable_latin1(text: &str) -> String {
    let text = remove_soft_breaks(text);
    let mut result = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(pos) = rest.find('=') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(byte) = hex_pair(after.as_bytes().get(..2)) {
            result.push(char::from(byte));
            rest = &after[2..];
        } else {
            result.push('=');
            rest = after;
        }
    }
    result.push_str(rest);

    result
}

fn hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    let hex = std::str::from_utf8(pair).ok()?;
    if hex.len() != 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Decodes the payload of a `Q`-encoded word: `_` is a space and `=XX`
/// is a byte.
///
/// # Errors
///
/// Returns an error on an incomplete or non-hex escape.
pub fn decode_q(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => {
                let byte = hex_pair(bytes.get(i + 1..i + 3)).ok_or_else(|| {
                    Error::InvalidEncoding("Incomplete escape sequence".to_string())
                })?;
                result.push(byte);
                i += 3;
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Interprets bytes in the given charset.
///
/// UTF-8 is always tried first. Latin-1 family and ASCII charsets fall
/// back to a byte-to-char mapping.
///
/// # Errors
///
/// Returns [`Error::Charset`] when the bytes cannot be read.
pub fn bytes_to_text(bytes: Vec<u8>, charset: &str) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) if is_latin1(charset) => Ok(e.into_bytes().into_iter().map(char::from).collect()),
        Err(_) => Err(Error::Charset {
            charset: charset.to_string(),
        }),
    }
}

fn is_latin1(charset: &str) -> bool {
    matches!(
        charset.to_ascii_lowercase().as_str(),
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii" | "windows-1252"
            | "cp1252"
    )
}

/// Decodes a single RFC 2047 word from its parts.
///
/// # Errors
///
/// Returns an error if the payload or charset cannot be decoded.
pub fn decode_word(charset: &str, encoding: &str, text: &str) -> Result<String> {
    // RFC 2231 language suffix: utf-8*en
    let charset = charset.split('*').next().unwrap_or(charset);
    let bytes = match encoding {
        "B" | "b" => decode_base64(text)?,
        "Q" | "q" => decode_q(text)?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };
    bytes_to_text(bytes, charset)
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Each word that fails to decode keeps its original text. Whitespace
/// between two adjacent encoded words is dropped, and every remaining
/// whitespace run collapses to a single space.
#[must_use]
pub fn decode_encoded_words(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut previous_was_word = false;

    for caps in ENCODED_WORD.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let gap = &text[last_end..whole.start()];
        if !(previous_was_word && gap.chars().all(char::is_whitespace)) {
            result.push_str(gap);
        }

        match decode_word(&caps[1], &caps[2], &caps[3]) {
            Ok(decoded) => result.push_str(&decoded),
            Err(e) => {
                trace!(word = whole.as_str(), error = %e, "keeping undecodable word");
                result.push_str(whole.as_str());
            }
        }

        previous_was_word = true;
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);

    collapse_whitespace(&result)
}

/// Collapses whitespace runs to single spaces and trims both ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
