//! Tagged command client.
//!
//! The client owns one framed stream and one tag counter. Every command
//! is stamped with the next tag and its transcript is collected up to and
//! including the completion line carrying that tag. The completion must be
//! `OK`, `NO` or `BAD`; anything else is a protocol violation.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::framed::{FramedStream, ResponseAccumulator, split_lines};
use crate::command::{Command, TagGenerator};
use crate::{Error, Result};

/// How long LOGOUT waits for the server before the stream is dropped.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Completion status of a tagged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed.
    No,
    /// Command was rejected as malformed.
    Bad,
}

/// One command/response exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Tag the command was issued with.
    pub tag: String,
    /// Every response line, completion line included, CRLF-terminated.
    pub lines: Vec<Vec<u8>>,
    /// Completion status.
    pub status: Status,
    /// Human-readable text after the completion status.
    pub text: String,
}

impl Exchange {
    /// Returns the transcript if the command completed with `OK`.
    pub fn into_ok(self) -> Result<Vec<Vec<u8>>> {
        match self.status {
            Status::Ok => Ok(self.lines),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
        }
    }
}

/// IMAP client connection.
pub struct Client<S> {
    stream: FramedStream<S>,
    tag_gen: TagGenerator,
    closed: bool,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream. The greeting has not been read yet.
    pub fn new(stream: S) -> Self {
        Self {
            stream: FramedStream::new(stream),
            tag_gen: TagGenerator::default(),
            closed: false,
        }
    }

    /// Consumes the server's untagged greeting.
    pub async fn read_greeting(&mut self) -> Result<()> {
        let greeting = self.stream.read_response().await?;
        let text = String::from_utf8_lossy(&greeting);
        let text = text.trim_end();
        trace!(greeting = %text, "server greeting");

        let mut words = text.splitn(3, ' ');
        if words.next() != Some("*") {
            return Err(Error::Protocol(format!("unexpected greeting: {text}")));
        }
        let status = words.next().unwrap_or_default();
        let rest = words.next().unwrap_or_default().to_string();

        if status.eq_ignore_ascii_case("OK") || status.eq_ignore_ascii_case("PREAUTH") {
            Ok(())
        } else if status.eq_ignore_ascii_case("BYE") {
            Err(Error::Bye(rest))
        } else {
            Err(Error::Protocol(format!("unexpected greeting: {text}")))
        }
    }

    /// Issues a command and collects its transcript.
    pub async fn command(&mut self, command: &Command) -> Result<Exchange> {
        let tag = self.tag_gen.next_tag();
        debug!(%tag, command = command.name(), "sending command");

        self.stream.write_command(&command.serialize(&tag)).await?;

        let mut accumulator = ResponseAccumulator::new(tag.as_str());
        let responses = accumulator.read_until_tagged(&mut self.stream).await?;

        let completion = responses
            .last()
            .ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;
        let (status, text) = parse_completion(completion, &tag)?;
        debug!(%tag, ?status, "command completed");

        let lines = responses.iter().flat_map(|r| split_lines(r)).collect();
        Ok(Exchange {
            tag,
            lines,
            status,
            text,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// Any non-`OK` completion is reported as [`Error::Auth`], whatever the
    /// server's reason text says.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let exchange = self
            .command(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        match exchange.status {
            Status::Ok => Ok(()),
            Status::No | Status::Bad => Err(Error::Auth(exchange.text)),
        }
    }

    /// Selects a mailbox and returns its message count.
    ///
    /// Returns 0 when the server does not announce `EXISTS`.
    pub async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let lines = self
            .command(&Command::Select {
                mailbox: mailbox.to_string(),
            })
            .await?
            .into_ok()?;

        Ok(lines.iter().find_map(|l| parse_exists(l)).unwrap_or(0))
    }

    /// Fetches UID, flags, headers and text body for `low..=high` in one
    /// round trip, returning the raw transcript.
    pub async fn fetch_range(&mut self, low: u32, high: u32) -> Result<Vec<Vec<u8>>> {
        if low == 0 || low > high {
            return Err(Error::Protocol(format!("invalid sequence range {low}:{high}")));
        }
        self.command(&Command::FetchRange { low, high })
            .await?
            .into_ok()
    }

    /// Logs out and closes the stream.
    ///
    /// Best effort: every error is swallowed so it never masks the caller's
    /// own failure. Only the first call does anything.
    pub async fn logout(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match tokio::time::timeout(LOGOUT_TIMEOUT, self.command(&Command::Logout)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(error = %e, "logout failed"),
            Err(_) => debug!("logout timed out"),
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "stream shutdown failed");
        }
    }

    /// Returns true once [`Client::logout`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }
}

/// Parses `<tag> OK|NO|BAD <text>`.
fn parse_completion(line: &[u8], tag: &str) -> Result<(Status, String)> {
    let line = String::from_utf8_lossy(line);
    let rest = line
        .trim_end()
        .strip_prefix(tag)
        .and_then(|r| r.strip_prefix(' '))
        .ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;

    let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match status.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        other => {
            return Err(Error::Protocol(format!(
                "unexpected completion status: {other}"
            )));
        }
    };

    Ok((status, text.to_string()))
}

/// Parses `* <n> EXISTS`.
fn parse_exists(line: &[u8]) -> Option<u32> {
    let line = std::str::from_utf8(line).ok()?;
    let mut words = line.split_whitespace();
    if words.next()? != "*" {
        return None;
    }
    let count = words.next()?.parse().ok()?;
    words
        .next()
        .filter(|w| w.eq_ignore_ascii_case("EXISTS"))
        .map(|_| count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_parse_completion() {
        assert_eq!(
            parse_completion(b"A0001 OK LOGIN completed\r\n", "A0001").unwrap(),
            (Status::Ok, "LOGIN completed".to_string())
        );
        assert_eq!(
            parse_completion(b"A0001 no [AUTHENTICATIONFAILED] nope\r\n", "A0001")
                .unwrap()
                .0,
            Status::No
        );
        assert_eq!(
            parse_completion(b"A0001 BAD\r\n", "A0001").unwrap(),
            (Status::Bad, String::new())
        );
        assert!(parse_completion(b"A0001 BYE going away\r\n", "A0001").is_err());
        assert!(parse_completion(b"A0002 OK\r\n", "A0001").is_err());
    }

    #[test]
    fn test_parse_exists() {
        assert_eq!(parse_exists(b"* 23 EXISTS\r\n"), Some(23));
        assert_eq!(parse_exists(b"* 0 exists\r\n"), Some(0));
        assert_eq!(parse_exists(b"* 5 RECENT\r\n"), None);
        assert_eq!(parse_exists(b"* FLAGS (\\Seen)\r\n"), None);
    }

    #[tokio::test]
    async fn test_greeting_ok() {
        let mock = Builder::new().read(b"* OK IMAP4rev1 ready\r\n").build();
        let mut client = Client::new(mock);
        client.read_greeting().await.unwrap();
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too busy\r\n").build();
        let mut client = Client::new(mock);
        assert!(matches!(client.read_greeting().await, Err(Error::Bye(_))));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .write(b"A0001 LOGIN \"user\" \"wrong\"\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut client = Client::new(mock);

        let err = client.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_select_counts_messages() {
        let mock = Builder::new()
            .write(b"A0001 SELECT \"INBOX\"\r\n")
            .read(b"* FLAGS (\\Answered \\Seen)\r\n")
            .read(b"* 42 EXISTS\r\n")
            .read(b"* 0 RECENT\r\n")
            .read(b"A0001 OK [READ-WRITE] SELECT completed\r\n")
            .build();
        let mut client = Client::new(mock);

        assert_eq!(client.select("INBOX").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_select_without_exists_is_empty() {
        let mock = Builder::new()
            .write(b"A0001 SELECT \"INBOX\"\r\n")
            .read(b"A0001 OK SELECT completed\r\n")
            .build();
        let mut client = Client::new(mock);

        assert_eq!(client.select("INBOX").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_select_no() {
        let mock = Builder::new()
            .write(b"A0001 SELECT \"Missing\"\r\n")
            .read(b"A0001 NO Mailbox doesn't exist\r\n")
            .build();
        let mut client = Client::new(mock);

        assert!(matches!(client.select("Missing").await, Err(Error::No(_))));
    }

    #[tokio::test]
    async fn test_fetch_range_rejects_bad_range() {
        let mock = Builder::new().build();
        let mut client = Client::new(mock);

        assert!(client.fetch_range(0, 5).await.is_err());
        assert!(client.fetch_range(6, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_tags_increase_across_commands() {
        let mock = Builder::new()
            .write(b"A0001 LOGIN \"u\" \"p\"\r\n")
            .read(b"A0001 OK\r\n")
            .write(b"A0002 SELECT \"INBOX\"\r\n")
            .read(b"* 1 EXISTS\r\nA0002 OK\r\n")
            .build();
        let mut client = Client::new(mock);

        client.login("u", "p").await.unwrap();
        assert_eq!(client.select("INBOX").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logout_runs_once_and_swallows_errors() {
        // Server closes the stream instead of answering LOGOUT.
        let mock = Builder::new().write(b"A0001 LOGOUT\r\n").build();
        let mut client = Client::new(mock);

        client.logout().await;
        assert!(client.is_closed());
        // Second call issues nothing.
        client.logout().await;
    }
}
