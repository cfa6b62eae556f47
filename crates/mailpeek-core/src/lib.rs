//! # mailpeek-core
//!
//! One bounded, read-only retrieval pass against an IMAP mailbox.
//!
//! This crate provides:
//! - Connection settings from process configuration
//! - The retrieval sequence with guaranteed logout
//! - Public message records, sorted newest first
//! - A four-class error taxonomy with fixed user-facing messages

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod record;
pub mod retrieve;
pub mod settings;

pub use error::{ErrorBody, Result, RetrievalError};
pub use record::{EmailRecord, NO_SUBJECT, UNKNOWN_SENDER, parse_sender, sort_newest_first};
pub use retrieve::{
    DEFAULT_LIMIT, Dialer, MAX_LIMIT, RetrievalRequest, TlsDialer, retrieve_emails, retrieve_with,
};
pub use settings::{ImapSettings, ImapSettingsBuilder, SettingsError};
