//! Parsing of `FETCH` transcripts.
//!
//! The parser is sans-I/O: it consumes lines that the connection layer has
//! already collected and never touches the network.

mod fetch;
mod headers;

pub use fetch::{FetchParser, ParsedMessage, parse_fetch_transcript};
pub use headers::HeaderFields;
