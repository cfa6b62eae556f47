//! `FETCH` response state machine.
//!
//! Walks the line transcript of a multi-message `FETCH` and splits each
//! message into a raw header block and a raw body block, while tracking
//! sequence number, UID and the `\Seen` flag.
//!
//! ```text
//!   AwaitingMessageStart ── "* n FETCH (" ──→ AwaitingBodyStart
//!   AwaitingBodyStart ── "BODY[HEADER...] {n}" ──→ CollectingHeaders
//!   AwaitingBodyStart ── "BODY[TEXT] {n}" ──→ CollectingBody
//!   Collecting* ── literal exhausted ──→ AwaitingBodyStart
//!   AwaitingBodyStart ── "* m FETCH (" ──→ (emit) AwaitingBodyStart
//! ```
//!
//! Literal sections are consumed by byte count. When a section is
//! announced without a literal, the section ends at a blank line (headers)
//! or at a line that is, or ends with, `)`.
//!
//! Servers may spread one message over several `FETCH` responses with the
//! same sequence number (UID and flags in one, sections in another); those
//! are merged. Responses that never carry a section are flag updates and
//! produce no message.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::headers::HeaderFields;
use crate::{Error, Result};

#[allow(clippy::expect_used)]
static MESSAGE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\* (\d+) FETCH \(").expect("static regex"));

#[allow(clippy::expect_used)]
static UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|[ (])UID (\d+)").expect("static regex"));

#[allow(clippy::expect_used)]
static FLAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)FLAGS \(([^)]*)\)").expect("static regex"));

/// `BODY[<section>]` followed by a literal, `NIL`, a quoted string, or
/// nothing at all (end of line).
#[allow(clippy::expect_used)]
static SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)BODY\[(HEADER[^\]]*|TEXT)\](?:<\d+>)?(?:[ \t]*\{(\d+)\+?\}[ \t]*$|[ \t]+NIL|[ \t]*"((?:[^"\\]|\\.)*)"|[ \t]*$)"#,
    )
    .expect("static regex")
});

/// One message as emitted by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Message sequence number.
    pub seq: u32,
    /// Unique identifier (never zero).
    pub uid: u32,
    /// Whether `\Seen` was set.
    pub seen: bool,
    /// Header fields, decomposed as soon as the header section ended.
    pub headers: HeaderFields,
    /// Raw body text; empty when the message had no body lines.
    pub body: String,
}

/// Which section a literal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Text,
}

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside any message.
    AwaitingMessageStart,
    /// Inside the header literal; `remaining` is `None` when no literal
    /// length was announced.
    CollectingHeaders { remaining: Option<usize> },
    /// Inside a message, between sections.
    AwaitingBodyStart,
    /// Inside the text body literal.
    CollectingBody { remaining: Option<usize> },
}

/// In-flight message. Replaced, never reset, at each message boundary.
#[derive(Debug, Default)]
struct RawMessageBlock {
    seq: u32,
    uid: Option<u32>,
    seen: Option<bool>,
    header: Vec<u8>,
    body: Vec<u8>,
    fields: Option<HeaderFields>,
    has_sections: bool,
}

impl RawMessageBlock {
    fn new(seq: u32) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }

    fn finish_headers(&mut self) {
        self.fields = Some(HeaderFields::extract(&String::from_utf8_lossy(
            &self.header,
        )));
    }

    /// Folds a later response for the same message into this one. The
    /// latest `FLAGS` win.
    fn merge(&mut self, later: Self) {
        self.uid = self.uid.or(later.uid);
        self.seen = later.seen.or(self.seen);
        if !later.header.is_empty() {
            // A header split across responses is decomposed again as a whole.
            self.fields = if self.header.is_empty() { later.fields } else { None };
            self.header.extend_from_slice(&later.header);
        }
        self.body.extend_from_slice(&later.body);
        self.has_sections |= later.has_sections;
    }

    fn into_message(self) -> Result<ParsedMessage> {
        let uid = self.uid.filter(|&u| u != 0).ok_or_else(|| {
            Error::Protocol(format!("FETCH response for message {} has no UID", self.seq))
        })?;

        let headers = match self.fields {
            Some(fields) => fields,
            None => HeaderFields::extract(&String::from_utf8_lossy(&self.header)),
        };

        Ok(ParsedMessage {
            seq: self.seq,
            uid,
            seen: self.seen.unwrap_or(false),
            headers,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }
}

/// Single-pass `FETCH` transcript parser.
#[derive(Debug)]
pub struct FetchParser {
    state: State,
    current: Option<RawMessageBlock>,
    completed: Vec<RawMessageBlock>,
    by_seq: HashMap<u32, usize>,
}

impl Default for FetchParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchParser {
    /// Creates a parser awaiting the first message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::AwaitingMessageStart,
            current: None,
            completed: Vec::new(),
            by_seq: HashMap::new(),
        }
    }

    /// Feeds one transcript line (CRLF included when present).
    pub fn feed(&mut self, line: &[u8]) {
        let mut pending = Some(line);

        while let Some(line) = pending.take() {
            match self.state {
                State::CollectingHeaders {
                    remaining: Some(remaining),
                } => {
                    let rest = self.consume_literal(Section::Header, remaining, line);
                    pending = (!rest.is_empty()).then_some(rest);
                }
                State::CollectingBody {
                    remaining: Some(remaining),
                } => {
                    let rest = self.consume_literal(Section::Text, remaining, line);
                    pending = (!rest.is_empty()).then_some(rest);
                }
                State::CollectingHeaders { remaining: None } => self.collect_header_line(line),
                State::CollectingBody { remaining: None } => self.collect_body_line(line),
                State::AwaitingMessageStart | State::AwaitingBodyStart => {
                    self.protocol_fragment(line);
                }
            }
        }
    }

    /// Flushes the last open message and returns every parsed message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when a message with sections has no UID
    /// in any of its responses.
    pub fn finish(mut self) -> Result<Vec<ParsedMessage>> {
        self.emit_current();
        self.completed
            .into_iter()
            .filter(|block| {
                if !block.has_sections {
                    trace!(seq = block.seq, "skipping FETCH without sections");
                }
                block.has_sections
            })
            .map(RawMessageBlock::into_message)
            .collect()
    }

    /// Appends literal bytes; returns whatever follows the literal on this
    /// line so it can be processed as protocol text.
    fn consume_literal<'a>(
        &mut self,
        section: Section,
        remaining: usize,
        line: &'a [u8],
    ) -> &'a [u8] {
        let take = remaining.min(line.len());
        let (content, rest) = line.split_at(take);
        self.append(section, content);

        let left = remaining - take;
        if left == 0 {
            self.end_section(section);
        } else {
            self.state = match section {
                Section::Header => State::CollectingHeaders {
                    remaining: Some(left),
                },
                Section::Text => State::CollectingBody {
                    remaining: Some(left),
                },
            };
        }
        rest
    }

    fn collect_header_line(&mut self, line: &[u8]) {
        let trimmed = trim_crlf(line);
        if trimmed.is_empty() || trimmed == b")" {
            self.end_section(Section::Header);
        } else {
            self.append_line(Section::Header, line);
        }
    }

    fn collect_body_line(&mut self, line: &[u8]) {
        let trimmed = trim_crlf(line);
        if let Some(content) = trimmed.strip_suffix(b")") {
            if !content.is_empty() {
                self.append_line(Section::Text, content);
            }
            self.end_section(Section::Text);
        } else {
            self.append_line(Section::Text, line);
        }
    }

    fn protocol_fragment(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);

        if let Some(caps) = MESSAGE_START.captures(text) {
            self.emit_current();
            let seq = caps[1].parse().unwrap_or(0);
            trace!(seq, "message start");
            self.current = Some(RawMessageBlock::new(seq));
            self.state = State::AwaitingBodyStart;
        }

        let Some(block) = self.current.as_mut() else {
            // Tagged completion or an unrelated untagged response.
            return;
        };

        if let Some(uid) = UID.captures(text).and_then(|c| c[1].parse().ok()) {
            block.uid = Some(uid);
        }
        if let Some(flags) = FLAGS.captures(text) {
            block.seen = Some(
                flags[1]
                    .split_whitespace()
                    .any(|f| f.eq_ignore_ascii_case("\\Seen")),
            );
        }

        for caps in SECTION.captures_iter(text) {
            let section = if caps[1].to_ascii_uppercase().starts_with("HEADER") {
                Section::Header
            } else {
                Section::Text
            };

            if let Some(len) = caps.get(2) {
                let remaining = len.as_str().parse::<usize>().unwrap_or(0);
                if remaining == 0 {
                    self.end_section(section);
                } else {
                    self.state = match section {
                        Section::Header => State::CollectingHeaders {
                            remaining: Some(remaining),
                        },
                        Section::Text => State::CollectingBody {
                            remaining: Some(remaining),
                        },
                    };
                }
            } else if let Some(quoted) = caps.get(3) {
                self.append(section, unescape_quoted(quoted.as_str()).as_bytes());
                self.end_section(section);
            } else if caps[0].trim_end().to_ascii_uppercase().ends_with("NIL") {
                self.end_section(section);
            } else {
                self.state = match section {
                    Section::Header => State::CollectingHeaders { remaining: None },
                    Section::Text => State::CollectingBody { remaining: None },
                };
            }
        }
    }

    fn append(&mut self, section: Section, bytes: &[u8]) {
        if let Some(block) = self.current.as_mut() {
            block.has_sections = true;
            match section {
                Section::Header => block.header.extend_from_slice(bytes),
                Section::Text => block.body.extend_from_slice(bytes),
            }
        }
    }

    /// Appends a whole line, terminating it with CRLF if it has no
    /// terminator of its own.
    fn append_line(&mut self, section: Section, line: &[u8]) {
        self.append(section, line);
        if !line.ends_with(b"\n") {
            self.append(section, b"\r\n");
        }
    }

    fn end_section(&mut self, section: Section) {
        if let Some(block) = self.current.as_mut() {
            block.has_sections = true;
            if section == Section::Header {
                block.finish_headers();
            }
        }
        self.state = if self.current.is_some() {
            State::AwaitingBodyStart
        } else {
            State::AwaitingMessageStart
        };
    }

    fn emit_current(&mut self) {
        self.state = State::AwaitingMessageStart;
        let Some(block) = self.current.take() else {
            return;
        };

        if let Some(&index) = self.by_seq.get(&block.seq) {
            trace!(seq = block.seq, "merging FETCH response into earlier one");
            self.completed[index].merge(block);
        } else {
            trace!(seq = block.seq, uid = ?block.uid, "message block complete");
            self.by_seq.insert(block.seq, self.completed.len());
            self.completed.push(block);
        }
    }
}

/// Parses a whole `FETCH` transcript.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when any message lacks a UID. No fetched
/// message is silently dropped.
pub fn parse_fetch_transcript(lines: &[Vec<u8>]) -> Result<Vec<ParsedMessage>> {
    let mut parser = FetchParser::new();
    for line in lines {
        parser.feed(line);
    }
    parser.finish()
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::split_lines;

    fn literal_message(seq: u32, uid: u32, flags: &str, header: &str, body: &str) -> String {
        format!(
            "* {seq} FETCH (UID {uid} FLAGS ({flags}) BODY[HEADER.FIELDS (FROM SUBJECT DATE)] {{{}}}\r\n{header} BODY[TEXT] {{{}}}\r\n{body})\r\n",
            header.len(),
            body.len()
        )
    }

    fn parse(transcript: &str) -> Result<Vec<ParsedMessage>> {
        parse_fetch_transcript(&split_lines(transcript.as_bytes()))
    }

    #[test]
    fn test_single_message() {
        let transcript = literal_message(
            1,
            42,
            "\\Seen",
            "From: Alice <alice@example.com>\r\nSubject: Hi\r\n\r\n",
            "Hello there\r\n",
        ) + "A0003 OK FETCH completed\r\n";

        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.seq, 1);
        assert_eq!(m.uid, 42);
        assert!(m.seen);
        assert_eq!(m.headers.subject.as_deref(), Some("Hi"));
        assert_eq!(m.headers.from.as_deref(), Some("Alice <alice@example.com>"));
        assert_eq!(m.body, "Hello there\r\n");
    }

    #[test]
    fn test_multiple_messages_and_unseen() {
        let transcript = literal_message(1, 10, "", "Subject: One\r\n\r\n", "first\r\n")
            + &literal_message(2, 11, "\\Answered", "Subject: Two\r\n\r\n", "second\r\n")
            + "A0003 OK done\r\n";

        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].uid, 10);
        assert!(!messages[0].seen);
        assert_eq!(messages[1].headers.subject.as_deref(), Some("Two"));
        assert_eq!(messages[1].body, "second\r\n");
    }

    #[test]
    fn test_body_lines_that_look_like_protocol() {
        let body = "* 2 FETCH (UID 99)\r\n)\r\nA0003 OK not really\r\n";
        let transcript = literal_message(1, 5, "", "Subject: Tricky\r\n\r\n", body);

        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uid, 5);
        assert_eq!(messages[0].body, body);
    }

    #[test]
    fn test_literal_without_trailing_crlf() {
        let transcript = literal_message(3, 7, "", "Subject: x\r\n\r\n", "no newline at end");
        let messages = parse(&transcript).unwrap();
        assert_eq!(messages[0].body, "no newline at end");
    }

    #[test]
    fn test_empty_body() {
        let transcript = "* 1 FETCH (UID 8 FLAGS () BODY[HEADER.FIELDS (SUBJECT)] {14}\r\nSubject: e\r\n\r\n BODY[TEXT] {0}\r\n)\r\n";
        let messages = parse(transcript).unwrap();
        assert_eq!(messages[0].body, "");
        assert_eq!(messages[0].headers.subject.as_deref(), Some("e"));
    }

    #[test]
    fn test_nil_and_quoted_sections() {
        let transcript = "* 4 FETCH (UID 12 BODY[HEADER.FIELDS (SUBJECT)] NIL BODY[TEXT] \"short \\\"body\\\"\")\r\n";
        let messages = parse(transcript).unwrap();
        assert_eq!(messages[0].headers, HeaderFields::default());
        assert_eq!(messages[0].body, "short \"body\"");
    }

    #[test]
    fn test_uid_and_flags_after_literals() {
        let transcript = "* 9 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {17}\r\nSubject: late\r\n\r\n BODY[TEXT] {4}\r\nbody UID 77 FLAGS (\\Seen))\r\n";
        let messages = parse(transcript).unwrap();
        assert_eq!(messages[0].uid, 77);
        assert!(messages[0].seen);
        assert_eq!(messages[0].body, "body");
    }

    #[test]
    fn test_missing_uid_is_fatal() {
        let transcript = "* 1 FETCH (FLAGS () BODY[TEXT] {5}\r\nhello)\r\n";
        let err = parse(transcript).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_zero_uid_is_fatal() {
        let transcript = "* 1 FETCH (UID 0 BODY[TEXT] {2}\r\nhi)\r\n";
        assert!(parse(transcript).is_err());
    }

    #[test]
    fn test_sections_without_literal_use_line_terminators() {
        let lines: Vec<Vec<u8>> = [
            "* 1 FETCH (UID 3 FLAGS (\\Seen) BODY[HEADER.FIELDS (FROM SUBJECT DATE)]",
            "From: a@b.example",
            "Subject: Plain lines",
            "",
            " BODY[TEXT]",
            "line one",
            "line two",
            ")",
            "A0003 OK",
        ]
        .iter()
        .map(|l| l.as_bytes().to_vec())
        .collect();

        let messages = parse_fetch_transcript(&lines).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].headers.subject.as_deref(), Some("Plain lines"));
        assert_eq!(messages[0].body, "line one\r\nline two\r\n");
    }

    #[test]
    fn test_ignores_unrelated_untagged_lines() {
        let transcript = String::from("* 3 EXISTS\r\n")
            + &literal_message(1, 2, "", "Subject: s\r\n\r\n", "b\r\n")
            + "* 4 EXISTS\r\n";
        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uid, 2);
    }

    #[test]
    fn test_skips_unsolicited_flag_update() {
        let transcript = String::from("* 7 FETCH (FLAGS (\\Seen))\r\n")
            + &literal_message(1, 2, "", "Subject: s\r\n\r\n", "b\r\n");
        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].seq, 1);
    }

    #[test]
    fn test_skips_flag_update_carrying_uid() {
        let transcript = String::from("* 7 FETCH (UID 12 FLAGS (\\Seen))\r\n")
            + &literal_message(1, 2, "", "Subject: s\r\n\r\n", "b\r\n")
            + "A0003 OK done\r\n";
        let messages = parse(&transcript).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!((messages[0].seq, messages[0].uid), (1, 2));
    }

    #[test]
    fn test_merges_uid_sent_before_sections() {
        let transcript = "* 3 FETCH (UID 9 FLAGS (\\Seen))\r\n\
            * 3 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {13}\r\n\
            Subject: hi\r\n BODY[TEXT] {5}\r\n\
            hello)\r\n\
            A0003 OK done\r\n";
        let messages = parse(transcript).unwrap();
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!((m.seq, m.uid), (3, 9));
        assert!(m.seen);
        assert_eq!(m.headers.subject.as_deref(), Some("hi"));
        assert_eq!(m.body, "hello");
    }

    #[test]
    fn test_merges_uid_sent_after_sections() {
        let transcript = "* 4 FETCH (BODY[TEXT] {5}\r\n\
            hello)\r\n\
            * 4 FETCH (UID 21 FLAGS ())\r\n\
            A0003 OK done\r\n";
        let messages = parse(transcript).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].uid, 21);
        assert!(!messages[0].seen);
        assert_eq!(messages[0].body, "hello");
    }

    #[test]
    fn test_empty_transcript() {
        assert!(parse("A0003 OK nothing\r\n").unwrap().is_empty());
    }
}
