//! Connection settings.
//!
//! Settings come from process configuration, never from the request.

use std::fmt;
use std::time::Duration;

/// Default IMAP port (implicit TLS).
pub const DEFAULT_PORT: u16 = 993;

/// Default mailbox.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Default bound on dial plus greeting.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable names.
pub mod env {
    /// Server hostname (required).
    pub const HOST: &str = "MAILPEEK_IMAP_HOST";
    /// Server port.
    pub const PORT: &str = "MAILPEEK_IMAP_PORT";
    /// Login user (required).
    pub const USER: &str = "MAILPEEK_IMAP_USER";
    /// Login password (required).
    pub const PASSWORD: &str = "MAILPEEK_IMAP_PASSWORD";
    /// Mailbox to read.
    pub const MAILBOX: &str = "MAILPEEK_MAILBOX";
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT_SECS: &str = "MAILPEEK_CONNECT_TIMEOUT_SECS";
}

/// Problem with the configured settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Host is empty.
    EmptyHost,
    /// Port is 0 or not a number.
    InvalidPort,
    /// Username is empty.
    EmptyUsername,
    /// Password is empty.
    EmptyPassword,
    /// Mailbox name is empty.
    EmptyMailbox,
    /// Timeout is 0 or not a number.
    InvalidTimeout,
}

impl SettingsError {
    /// Human-readable message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "IMAP host is required",
            Self::InvalidPort => "IMAP port must be 1-65535",
            Self::EmptyUsername => "IMAP username is required",
            Self::EmptyPassword => "IMAP password is required",
            Self::EmptyMailbox => "Mailbox name is required",
            Self::InvalidTimeout => "Connect timeout must be a positive number of seconds",
        }
    }

    /// Setting the error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyUsername => "username",
            Self::EmptyPassword => "password",
            Self::EmptyMailbox => "mailbox",
            Self::InvalidTimeout => "connect_timeout",
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SettingsError {}

/// Resolved IMAP connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ImapSettings {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Username for LOGIN.
    pub username: String,
    /// Password for LOGIN.
    pub password: String,
    /// Mailbox to select.
    pub mailbox: String,
    /// Bound on dial plus greeting.
    pub connect_timeout: Duration,
}

impl Default for ImapSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            mailbox: DEFAULT_MAILBOX.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ImapSettings {
    /// Starts a builder with defaults.
    #[must_use]
    pub fn builder() -> ImapSettingsBuilder {
        ImapSettingsBuilder::default()
    }

    /// Reads settings from the process environment.
    ///
    /// Missing required values are left empty and surface from
    /// [`ImapSettings::validate`], so a misconfigured process can still
    /// start and answer with a configuration error.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    ///
    /// Unparsable numbers become 0, which [`ImapSettings::validate`]
    /// rejects.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = value(env::PORT).map_or(DEFAULT_PORT, |v| v.parse().unwrap_or(0));
        let connect_timeout = value(env::CONNECT_TIMEOUT_SECS).map_or(DEFAULT_CONNECT_TIMEOUT, |v| {
            Duration::from_secs(v.parse().unwrap_or(0))
        });

        Self {
            host: value(env::HOST).unwrap_or_default(),
            port,
            username: value(env::USER).unwrap_or_default(),
            // Passwords may legitimately carry surrounding spaces.
            password: lookup(env::PASSWORD).unwrap_or_default(),
            mailbox: value(env::MAILBOX).unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
            connect_timeout,
        }
    }

    /// Checks that every required setting is present and sane.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::EmptyHost);
        }
        if self.port == 0 {
            return Err(SettingsError::InvalidPort);
        }
        if self.username.trim().is_empty() {
            return Err(SettingsError::EmptyUsername);
        }
        if self.password.is_empty() {
            return Err(SettingsError::EmptyPassword);
        }
        if self.mailbox.trim().is_empty() {
            return Err(SettingsError::EmptyMailbox);
        }
        if self.connect_timeout.is_zero() {
            return Err(SettingsError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Builder for [`ImapSettings`].
#[derive(Debug, Default)]
pub struct ImapSettingsBuilder {
    settings: ImapSettings,
}

impl ImapSettingsBuilder {
    /// Sets the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.username = username.into();
        self.settings.password = password.into();
        self
    }

    /// Sets the mailbox.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.settings.mailbox = mailbox.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Finishes the builder. Validation happens at retrieval time.
    #[must_use]
    pub fn build(self) -> ImapSettings {
        self.settings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_lookup() {
        let settings = ImapSettings::from_lookup(lookup(&[
            (env::HOST, "imap.example.com"),
            (env::USER, "alice"),
            (env::PASSWORD, "secret"),
        ]));

        assert_eq!(settings.port, 993);
        assert_eq!(settings.mailbox, "INBOX");
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let settings = ImapSettings::from_lookup(lookup(&[
            (env::HOST, " imap.example.com "),
            (env::PORT, "1993"),
            (env::USER, "alice"),
            (env::PASSWORD, "secret"),
            (env::MAILBOX, "Archive"),
            (env::CONNECT_TIMEOUT_SECS, "5"),
        ]));

        assert_eq!(settings.host, "imap.example.com");
        assert_eq!(settings.port, 1993);
        assert_eq!(settings.mailbox, "Archive");
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_values() {
        let settings = ImapSettings::from_lookup(lookup(&[]));
        assert_eq!(settings.validate(), Err(SettingsError::EmptyHost));

        let settings = ImapSettings::from_lookup(lookup(&[(env::HOST, "h"), (env::USER, "u")]));
        assert_eq!(settings.validate(), Err(SettingsError::EmptyPassword));
    }

    #[test]
    fn test_bad_numbers_fail_validation() {
        let base = [
            (env::HOST, "h"),
            (env::USER, "u"),
            (env::PASSWORD, "p"),
        ];

        let mut pairs = base.to_vec();
        pairs.push((env::PORT, "imap"));
        let settings = ImapSettings::from_lookup(lookup(&pairs));
        assert_eq!(settings.validate(), Err(SettingsError::InvalidPort));

        let mut pairs = base.to_vec();
        pairs.push((env::CONNECT_TIMEOUT_SECS, "0"));
        let settings = ImapSettings::from_lookup(lookup(&pairs));
        assert_eq!(settings.validate(), Err(SettingsError::InvalidTimeout));
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = ImapSettings::builder()
            .host("imap.example.com")
            .credentials("alice", "hunter2")
            .build();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_builder() {
        let settings = ImapSettings::builder()
            .host("localhost")
            .port(143)
            .credentials("u", "p")
            .mailbox("Sent")
            .connect_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(settings.port, 143);
        assert_eq!(settings.mailbox, "Sent");
        assert!(settings.validate().is_ok());
        assert_eq!(SettingsError::EmptyHost.field(), "host");
    }
}
