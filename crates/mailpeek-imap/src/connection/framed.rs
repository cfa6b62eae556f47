//! Line framing for the IMAP byte stream.
//!
//! Server output is a sequence of CRLF lines, any of which may announce a
//! `{n}` literal: exactly `n` raw bytes that follow the line and may contain
//! anything, CRLF and tag-like text included. A response is one line plus
//! the literals it announces plus the continuation lines after them.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Read buffer capacity.
const READ_CAPACITY: usize = 8 * 1024;

/// Longest accepted line, CRLF excluded.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest accepted literal.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Buffered, literal-aware reader/writer over a byte stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    outgoing: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_CAPACITY, stream),
            outgoing: BytesMut::with_capacity(256),
        }
    }

    /// Reads one response, literal payloads included.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = self.read_line().await?;
        let mut tail = 0;

        while let Some(len) = parse_literal_length(&response[tail..]) {
            self.read_literal(len, &mut response).await?;
            tail = response.len();
            let next = self.read_line().await?;
            response.extend_from_slice(&next);
        }

        Ok(response)
    }

    async fn read_literal(&mut self, len: usize, into: &mut Vec<u8>) -> Result<()> {
        if len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        let start = into.len();
        into.resize(start + len, 0);
        self.reader.read_exact(&mut into[start..]).await?;
        Ok(())
    }

    /// Reads a single CRLF-terminated line, terminator included.
    ///
    /// A bare LF does not end the line. Fails with an `UnexpectedEof` I/O
    /// error if the stream ends first.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let budget = (MAX_LINE_LENGTH + 2).saturating_sub(line.len());
            if budget == 0 {
                return Err(Error::Protocol("line too long".to_string()));
            }

            let read = (&mut self.reader)
                .take(budget as u64)
                .read_until(b'\n', &mut line)
                .await?;
            if read == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            if line.ends_with(b"\r\n") {
                return Ok(line);
            }
        }
    }

    /// Sends one command line and flushes. CRLF is appended when missing.
    pub async fn write_command(&mut self, line: &[u8]) -> Result<()> {
        self.outgoing.clear();
        self.outgoing.put_slice(line);
        if !line.ends_with(b"\r\n") {
            self.outgoing.put_slice(b"\r\n");
        }

        let stream = self.reader.get_mut();
        stream.write_all(&self.outgoing).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Shuts down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }
}

/// Length announced by a trailing `{n}` or `{n+}`, if the line ends in one.
pub(crate) fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;

    let open = line.iter().rposition(|&b| b == b'{')?;
    let inner = line[open + 1..].strip_suffix(b"}")?;
    let inner = inner.strip_suffix(b"+").unwrap_or(inner);

    if inner.is_empty() || !inner.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(inner).ok()?.parse().ok()
}

/// Splits a response into CRLF-terminated lines, terminators kept.
///
/// A trailing fragment without CRLF is returned as its own line.
#[must_use]
pub fn split_lines(response: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = Vec::new();
    let mut start = 0;

    for (i, pair) in response.windows(2).enumerate() {
        if pair == b"\r\n" {
            lines.push(response[start..i + 2].to_vec());
            start = i + 2;
        }
    }
    if start < response.len() {
        lines.push(response[start..].to_vec());
    }

    lines
}

/// Collects every response of one exchange, up to and including the
/// tagged completion.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
}

impl ResponseAccumulator {
    /// Accumulator waiting for `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
        }
    }

    /// Reads until the tagged completion arrives.
    ///
    /// Literal payloads are read as part of their response, so a literal
    /// line that happens to begin with the tag never ends the exchange.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let done = is_tagged_with(&response, &self.tag);
            self.responses.push(response);
            if done {
                return Ok(std::mem::take(&mut self.responses));
            }
        }
    }
}

/// Returns true if `line` starts with `"<tag> "`.
pub(crate) fn is_tagged_with(line: &[u8], tag: &str) -> bool {
    line.strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}
