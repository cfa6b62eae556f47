//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream to simulate IMAP server responses
//! without requiring a real server connection.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use proptest::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailpeek_imap::connection::split_lines;
use mailpeek_imap::{Client, Error, parse_fetch_transcript};

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Vec<u8>,
    /// Number of shutdown calls.
    shutdowns: usize,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Vec::new(),
            shutdowns: 0,
        }
    }

    fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

fn fetch_item(seq: u32, uid: u32, header: &str, body: &str) -> String {
    format!(
        "* {seq} FETCH (UID {uid} FLAGS () BODY[HEADER.FIELDS (FROM SUBJECT DATE CONTENT-TYPE CONTENT-TRANSFER-ENCODING)] {{{}}}\r\n{header} BODY[TEXT] {{{}}}\r\n{body})\r\n",
        header.len(),
        body.len()
    )
}

#[tokio::test]
async fn test_full_retrieval_sequence() {
    let server = String::from("* OK [CAPABILITY IMAP4rev1] ready\r\n")
        + "A0001 OK LOGIN completed\r\n"
        + "* 2 EXISTS\r\n* 0 RECENT\r\nA0002 OK [READ-WRITE] SELECT completed\r\n"
        + &fetch_item(1, 100, "Subject: First\r\n\r\n", "one\r\n")
        + &fetch_item(2, 101, "Subject: Second\r\n\r\n", "two\r\n")
        + "A0003 OK FETCH completed\r\n"
        + "* BYE logging out\r\nA0004 OK LOGOUT completed\r\n";

    let mut client = Client::new(MockStream::new(server.as_bytes()));
    client.read_greeting().await.unwrap();
    client.login("user", "pass").await.unwrap();
    let exists = client.select("INBOX").await.unwrap();
    assert_eq!(exists, 2);

    let lines = client.fetch_range(1, exists).await.unwrap();
    let messages = parse_fetch_transcript(&lines).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].uid, 100);
    assert_eq!(messages[1].headers.subject.as_deref(), Some("Second"));

    client.logout().await;

    let sent = client.get_ref().sent_text();
    assert!(sent.starts_with("A0001 LOGIN \"user\" \"pass\"\r\nA0002 SELECT \"INBOX\"\r\n"));
    assert!(sent.contains("A0003 FETCH 1:2 (UID FLAGS BODY.PEEK[HEADER.FIELDS"));
    assert!(sent.ends_with("A0004 LOGOUT\r\n"));
    assert_eq!(client.get_ref().shutdowns, 1);
}

#[tokio::test]
async fn test_connection_closed_mid_fetch() {
    let server = String::from("* OK ready\r\n")
        + "A0001 OK\r\n"
        + "* 1 FETCH (UID 5 BODY[TEXT] {100}\r\ntruncated";

    let mut client = Client::new(MockStream::new(server.as_bytes()));
    client.read_greeting().await.unwrap();
    client.login("u", "p").await.unwrap();

    let err = client.fetch_range(1, 1).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    client.logout().await;
    client.logout().await;
    assert_eq!(client.get_ref().shutdowns, 1);
}

#[tokio::test]
async fn test_unknown_completion_is_protocol_error() {
    let server = "* OK ready\r\nA0001 WHAT is this\r\n";
    let mut client = Client::new(MockStream::new(server.as_bytes()));
    client.read_greeting().await.unwrap();

    let err = client.select("INBOX").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn test_transcript_with_crlf_split_literals() {
    let transcript = fetch_item(1, 9, "Subject: =?UTF-8?B?SGVqIGRhcg==?=\r\n\r\n", "")
        + "A0003 OK\r\n";
    let messages = parse_fetch_transcript(&split_lines(transcript.as_bytes())).unwrap();
    assert_eq!(messages[0].body, "");
    assert_eq!(
        messages[0].headers.subject.as_deref(),
        Some("=?UTF-8?B?SGVqIGRhcg==?=")
    );
}

proptest! {
    #[test]
    fn prop_literal_body_survives_parsing(body in "[ -~\r\n]{0,200}") {
        let transcript = fetch_item(1, 1, "Subject: p\r\n\r\n", &body) + "A0003 OK\r\n";
        let messages = parse_fetch_transcript(&split_lines(transcript.as_bytes())).unwrap();
        prop_assert_eq!(messages.len(), 1);
        prop_assert_eq!(&messages[0].body, &body);
    }
}
