//! `mailpeek` - newest messages of an IMAP mailbox over HTTP
//!
//! Connection settings come from the environment; each request runs one
//! bounded, read-only retrieval.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod routes;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailpeek_core::ImapSettings;

/// Listen address variable.
const LISTEN_ENV: &str = "MAILPEEK_LISTEN";
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailpeek=info,mailpeek_core=info,mailpeek_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ImapSettings::from_env();
    if let Err(e) = settings.validate() {
        warn!(field = e.field(), error = %e, "incomplete settings, /emails will report a configuration error");
    }

    let listen = std::env::var(LISTEN_ENV).unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;

    info!(%listen, host = %settings.host, mailbox = %settings.mailbox, "Starting mailpeek");

    axum::serve(listener, routes::router(settings))
        .await
        .context("server stopped")?;

    Ok(())
}
