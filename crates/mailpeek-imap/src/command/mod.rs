//! IMAP commands issued by the client.
//!
//! Only the handful of commands needed for a read-only retrieval pass are
//! modeled: LOGIN, SELECT, FETCH over a sequence range, and LOGOUT.

mod tag_generator;

pub use tag_generator::TagGenerator;

/// Header fields requested for every message.
///
/// `Content-Type` and `Content-Transfer-Encoding` ride along so the body
/// decoder knows the top-level boundary and transfer encoding.
pub const FETCH_HEADER_FIELDS: &[&str] = &[
    "FROM",
    "SUBJECT",
    "DATE",
    "CONTENT-TYPE",
    "CONTENT-TRANSFER-ENCODING",
];

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// LOGIN with username and password.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT a mailbox.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// FETCH an inclusive sequence range with UID, flags, selected header
    /// fields and the text body. Uses `BODY.PEEK` so `\Seen` is untouched.
    FetchRange {
        /// Lowest sequence number.
        low: u32,
        /// Highest sequence number.
        high: u32,
    },
    /// LOGOUT.
    Logout,
}

impl Command {
    /// Renders the command text without tag or line terminator.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Login { username, password } => {
                format!("LOGIN {} {}", quote(username), quote(password))
            }
            Self::Select { mailbox } => format!("SELECT {}", quote(mailbox)),
            Self::FetchRange { low, high } => format!(
                "FETCH {low}:{high} (UID FLAGS BODY.PEEK[HEADER.FIELDS ({})] BODY.PEEK[TEXT])",
                FETCH_HEADER_FIELDS.join(" ")
            ),
            Self::Logout => "LOGOUT".to_string(),
        }
    }

    /// Serializes the command with the given tag, CRLF-terminated.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        format!("{tag} {}\r\n", self.render()).into_bytes()
    }

    /// Returns the command name, safe to log (never contains credentials).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::FetchRange { .. } => "FETCH",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Renders a string as an IMAP quoted string.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
