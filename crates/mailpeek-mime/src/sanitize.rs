//! Body sanitizer.
//!
//! Turns a decoded body into readable plain text by running an ordered
//! list of textual cleanup rules. Mail servers and clients leak MIME
//! structure into bodies in many inconsistent ways, so the rules are
//! tolerant rather than strict.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::encoding::{collapse_whitespace, decode_quoted_printable, decode_quoted_printable_latin1};

/// Visible characters kept in a preview.
pub const PREVIEW_LENGTH: usize = 150;

/// Upper bound on cleanup passes per body.
const MAX_PASSES: usize = 16;

#[allow(clippy::expect_used)]
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static MIME_BOILERPLATE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)This is a multi-part message in MIME format\.?"));

static CONTENT_HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    re(
        r"(?im)^[ \t]*content-(?:type|transfer-encoding|disposition)[ \t]*:[^\r\n]*(?:\r?\n[ \t]+[^\r\n]*)*(?:\r?\n)?",
    )
});

static CONTENT_HEADER_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    re(
        r#"(?i)content-(?:type|transfer-encoding|disposition)[ \t]*:[ \t]*[^\s;]+(?:[ \t]*;[ \t]*[\w-]+=(?:"[^"]*"|[^\s;]+))*;?"#,
    )
});

static CLOSING_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^--\S+--[ \t]*\r?$"));

static BOUNDARY_LINE: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^[ \t]*--[^\r\n]*"));

static INLINE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| re(r"-{2,}[0-9A-Za-z=_.]*\d{6,}[0-9A-Za-z=_.]*-*"));

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<style\b[^>]*>.*?</style\s*>"));

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?is)<script\b[^>]*>.*?</script\s*>"));

static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<!--.*?-->"));

static BLOCK_TAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)<(?:br|/p|/div|/tr|/li|/h[1-6]|/table)\b[^>]*>"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^>]*)?/?>|<![A-Za-z][^>]*>"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| re(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]{2,8});"));

/// Runs the full cleanup pipeline over a body.
///
/// The steps, in order:
///
/// 1. MIME boilerplate sentence
/// 2. leaked `Content-Type`, `Content-Transfer-Encoding` and
///    `Content-Disposition` headers
/// 3. boundary lines and long inline dash/digit runs
/// 4. quoted-printable soft breaks and `=XX` escapes
/// 5. Latin-1 fallback when the escaped bytes are not UTF-8
/// 6. HTML markup
/// 7. HTML entities
/// 8. whitespace collapsing
///
/// Decoding can expose new markup or escapes (`&lt;b&gt;` becomes `<b>`),
/// so the pipeline is repeated until the text stops changing. Every step
/// only shrinks the text, which bounds the loop; [`MAX_PASSES`] caps it
/// for deeply nested escapes.
#[must_use]
pub fn sanitize_body(body: &str) -> String {
    let mut text = sanitize_pass(body);
    for _ in 1..MAX_PASSES {
        let next = sanitize_pass(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn sanitize_pass(body: &str) -> String {
    let text = MIME_BOILERPLATE.replace_all(body, "");
    let text = strip_content_headers(&text);
    let text = strip_boundaries(&text);
    let text = decode_escapes(&text);
    let text = strip_html(&text);
    let text = decode_entities(&text);
    collapse_whitespace(&text)
}

/// Removes leaked MIME content headers, whole lines first and then any
/// that sit in the middle of a line.
#[must_use]
pub fn strip_content_headers(text: &str) -> String {
    let text = CONTENT_HEADER_LINE.replace_all(text, "");
    CONTENT_HEADER_INLINE.replace_all(&text, "").into_owned()
}

/// Applies the boundary rules in order: exact closing delimiters, any
/// line starting with `--`, then long inline runs such as
/// `----_=_NextPart_000123456`.
#[must_use]
pub fn strip_boundaries(text: &str) -> String {
    let text = CLOSING_BOUNDARY.replace_all(text, "");
    let text = BOUNDARY_LINE.replace_all(&text, "");
    INLINE_BOUNDARY.replace_all(&text, "").into_owned()
}

/// Undoes quoted-printable escaping.
///
/// The UTF-8 reading is kept only when it is valid; otherwise every
/// escape maps to its Latin-1 character.
#[must_use]
pub fn decode_escapes(text: &str) -> String {
    if !text.contains('=') {
        return text.to_string();
    }
    String::from_utf8(decode_quoted_printable(text))
        .unwrap_or_else(|_| decode_quoted_printable_latin1(text))
}

/// Removes markup, keeping a space where block elements ended.
#[must_use]
pub fn strip_html(text: &str) -> String {
    let text = STYLE_BLOCK.replace_all(text, "");
    let text = SCRIPT_BLOCK.replace_all(&text, "");
    let text = HTML_COMMENT.replace_all(&text, "");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    HTML_TAG.replace_all(&text, "").into_owned()
}

/// Decodes common named entities plus decimal and hex numeric ones.
/// Unknown entities are left as written.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            decode_entity(entity).map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    let named = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        _ => {
            let code = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))?
                .ok()?;
            return char::from_u32(code);
        }
    };
    Some(named)
}

/// Derives a preview: the first [`PREVIEW_LENGTH`] characters, with `...`
/// appended when the text was cut.
#[must_use]
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LENGTH) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
