//! # mailpeek-mime
//!
//! Turns raw message data fetched over IMAP into readable text.
//!
//! ## Features
//!
//! - **Header words**: RFC 2047 `=?charset?B|Q?...?=` decoding that never
//!   fails a whole header
//! - **Part selection**: first `text/plain` part of a multipart body, with
//!   `text/html` as fallback and nested multiparts searched
//! - **Sanitizing**: an ordered pipeline that removes leaked MIME
//!   structure, quoted-printable escapes, markup and entities
//! - **Dates**: lenient RFC 2822 `Date` parsing
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpeek_mime::{decode_encoded_words, extract_text, preview, sanitize_body};
//!
//! let subject = decode_encoded_words("=?UTF-8?B?SGVqIGRhcg==?=");
//! assert_eq!(subject, "Hej dar");
//!
//! let text = extract_text(raw_body, content_type, transfer_encoding);
//! let body = sanitize_body(&text);
//! println!("{}", preview(&body));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod date;
mod error;
mod part;

pub mod encoding;
pub mod sanitize;

pub use date::parse_date;
pub use encoding::decode_encoded_words;
pub use error::{Error, Result};
pub use part::{TransferEncoding, extract_text, find_boundary, select_body_part};
pub use sanitize::{PREVIEW_LENGTH, preview, sanitize_body};
