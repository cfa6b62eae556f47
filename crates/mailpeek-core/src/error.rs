//! Error types for the retrieval pipeline.
//!
//! Callers only ever see one of four fixed messages. The underlying IMAP
//! or configuration detail is logged where the failure is mapped and
//! never crosses this boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal failure of one retrieval. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetrievalError {
    /// Required connection settings are missing or invalid.
    #[error("Email service is not configured.")]
    Configuration,

    /// Socket, DNS or TLS failure, or the server closed the stream before
    /// the greeting completed.
    #[error("Unable to connect to the mail server.")]
    Connect,

    /// The server rejected the login.
    #[error("Authentication with the mail server failed.")]
    Auth,

    /// Malformed or unexpected response after login, including a
    /// `FETCH` transcript that cannot be parsed.
    #[error("Failed to retrieve emails from the mail server.")]
    Protocol,
}

impl RetrievalError {
    /// HTTP-style status code for the failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Configuration => 500,
            Self::Connect => 503,
            Self::Auth => 401,
            Self::Protocol => 502,
        }
    }

    /// Short machine-readable name, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connect => "connect",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
        }
    }

    /// JSON body sent to callers.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

/// `{"error": "<message>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// User-facing message.
    pub error: String,
}

/// Result type alias using [`RetrievalError`].
pub type Result<T> = std::result::Result<T, RetrievalError>;
