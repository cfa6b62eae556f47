//! # mailpeek-imap
//!
//! A small, read-only IMAP client built for one job: log in, select a
//! mailbox, pull a range of messages in a single `FETCH`, and hand the
//! transcript to a line-oriented state machine that splits it into
//! per-message header and body blocks.
//!
//! ## Layers
//!
//! - [`connection`]: TLS/plain streams, CRLF framing with literal support,
//!   and the tagged command [`Client`]
//! - [`command`]: tag generation and command line rendering
//! - [`parser`]: the `FETCH` response state machine and header field
//!   extraction
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpeek_imap::{Client, connection::connect_tls, parser::parse_fetch_transcript};
//!
//! #[tokio::main]
//! async fn main() -> mailpeek_imap::Result<()> {
//!     let stream = connect_tls("imap.example.com", 993).await?;
//!     let mut client = Client::new(stream);
//!     client.read_greeting().await?;
//!     client.login("user@example.com", "password").await?;
//!
//!     let exists = client.select("INBOX").await?;
//!     if exists > 0 {
//!         let low = exists.saturating_sub(19).max(1);
//!         let lines = client.fetch_range(low, exists).await?;
//!         for message in parse_fetch_transcript(&lines)? {
//!             println!("{} {:?}", message.uid, message.headers.subject);
//!         }
//!     }
//!
//!     client.logout().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;

pub use command::{Command, TagGenerator};
pub use connection::{Client, Exchange, FramedStream, ImapStream, ResponseAccumulator, Status};
pub use error::{Error, Result};
pub use parser::{FetchParser, HeaderFields, ParsedMessage, parse_fetch_transcript};
