//! IMAP connection management.
//!
//! This module provides:
//! - TLS/plaintext stream abstraction
//! - Framed, literal-aware line I/O
//! - The tagged command client used for a retrieval pass

mod client;
mod framed;
mod stream;

pub use client::{Client, Exchange, Status};
pub use framed::{FramedStream, ResponseAccumulator, split_lines};
pub use stream::{ImapStream, connect_plain, connect_tls, tls_connector};
