//! The retrieval sequence.
//!
//! connect → login → select → fetch → parse → build records → sort,
//! with logout on every exit path once a stream exists.

use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mailpeek_imap::connection::{ImapStream, connect_tls};
use mailpeek_imap::{Client, parse_fetch_transcript};

use crate::error::{Result, RetrievalError};
use crate::record::{EmailRecord, sort_newest_first};
use crate::settings::ImapSettings;

/// Messages returned when the request does not say.
pub const DEFAULT_LIMIT: u32 = 20;

/// Hard cap on messages per retrieval.
pub const MAX_LIMIT: u32 = 500;

/// Incoming request: `{"limit": n}`, every field optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Maximum number of messages to return.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl RetrievalRequest {
    /// Request for `limit` messages.
    #[must_use]
    pub const fn with_limit(limit: u32) -> Self {
        Self { limit: Some(limit) }
    }

    /// Limit actually used: absent or 0 means [`DEFAULT_LIMIT`], anything
    /// above [`MAX_LIMIT`] is clamped.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(n) => n.min(MAX_LIMIT),
        }
    }
}

/// Opens the byte stream to the server.
pub trait Dialer: Send + Sync {
    /// Stream type produced.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Connects to `host:port`.
    fn dial(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = mailpeek_imap::Result<Self::Stream>> + Send;
}

/// Implicit-TLS dialer backed by the webpki root store.
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsDialer;

impl Dialer for TlsDialer {
    type Stream = ImapStream;

    fn dial(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = mailpeek_imap::Result<ImapStream>> + Send {
        connect_tls(host, port)
    }
}

/// Retrieves the newest messages over implicit TLS.
///
/// # Errors
///
/// Returns one of the four [`RetrievalError`] classes.
pub async fn retrieve_emails(
    settings: &ImapSettings,
    request: RetrievalRequest,
) -> Result<Vec<EmailRecord>> {
    retrieve_with(&TlsDialer, settings, request).await
}

/// Retrieves the newest messages through the given dialer.
///
/// Settings are validated before anything touches the network. Once a
/// stream exists the client is logged out and the stream shut down
/// exactly once, whatever happened in between.
///
/// # Errors
///
/// Returns one of the four [`RetrievalError`] classes.
pub async fn retrieve_with<D: Dialer>(
    dialer: &D,
    settings: &ImapSettings,
    request: RetrievalRequest,
) -> Result<Vec<EmailRecord>> {
    if let Err(e) = settings.validate() {
        warn!(field = e.field(), error = %e, "settings rejected");
        return Err(RetrievalError::Configuration);
    }

    let limit = request.effective_limit();
    let stream = match timeout(
        settings.connect_timeout,
        dialer.dial(&settings.host, settings.port),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(host = %settings.host, port = settings.port, error = %e, "connect failed");
            return Err(RetrievalError::Connect);
        }
        Err(_) => {
            let e = mailpeek_imap::Error::Timeout(settings.connect_timeout);
            warn!(host = %settings.host, port = settings.port, error = %e, "connect failed");
            return Err(RetrievalError::Connect);
        }
    };

    let mut client = Client::new(stream);
    let outcome = run_session(&mut client, settings, limit).await;
    client.logout().await;

    match &outcome {
        Ok(records) => info!(
            mailbox = %settings.mailbox,
            count = records.len(),
            limit,
            "retrieval complete"
        ),
        Err(e) => debug!(kind = e.kind(), "retrieval failed"),
    }
    outcome
}

async fn run_session<S>(
    client: &mut Client<S>,
    settings: &ImapSettings,
    limit: u32,
) -> Result<Vec<EmailRecord>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(settings.connect_timeout, client.read_greeting()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "greeting failed");
            return Err(RetrievalError::Connect);
        }
        Err(_) => {
            let e = mailpeek_imap::Error::Timeout(settings.connect_timeout);
            warn!(error = %e, "greeting failed");
            return Err(RetrievalError::Connect);
        }
    }

    client
        .login(&settings.username, &settings.password)
        .await
        .map_err(|e| match e {
            mailpeek_imap::Error::Auth(text) => {
                warn!(reason = %text, "login rejected");
                RetrievalError::Auth
            }
            other => protocol_failure("login", &other),
        })?;

    let count = client
        .select(&settings.mailbox)
        .await
        .map_err(|e| protocol_failure("select", &e))?;

    if count == 0 {
        debug!(mailbox = %settings.mailbox, "mailbox is empty");
        return Ok(Vec::new());
    }

    let low = count.saturating_sub(limit).saturating_add(1);
    let lines = client
        .fetch_range(low, count)
        .await
        .map_err(|e| protocol_failure("fetch", &e))?;

    let messages = parse_fetch_transcript(&lines).map_err(|e| protocol_failure("parse", &e))?;
    debug!(low, high = count, parsed = messages.len(), "fetch parsed");

    let now = Utc::now();
    let mut records: Vec<EmailRecord> = messages
        .into_iter()
        .map(|message| EmailRecord::from_parsed(message, now))
        .collect();
    sort_newest_first(&mut records);

    Ok(records)
}

fn protocol_failure(step: &'static str, error: &mailpeek_imap::Error) -> RetrievalError {
    warn!(step, error = %error, transport = error.is_transport(), "retrieval step failed");
    RetrievalError::Protocol
}
