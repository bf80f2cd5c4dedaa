//! A minimal FMTP daemon: accepts connections and logs every message.
//!
//! Configuration comes from the environment:
//!   FMTP_ID    local identifier            (default: FMTPD)
//!   FMTP_BIND  listen address              (default: 127.0.0.1:8500)
//!   FMTP_LOG   tracing filter directive    (default: error)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use fmtp_core::{FmtpError, FmtpIdentifier, FmtpMessage};
use fmtp_tokio::{Client, Connection, Handler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

struct LogHandler;

impl Handler for LogHandler {
    fn on_message(&self, conn: &Connection, msg: FmtpMessage) {
        info!(remote = %conn.remote_id(), "{msg}");
    }

    fn on_error(&self, conn: &Connection, err: &FmtpError) {
        warn!(remote = %conn.remote_id(), addr = ?conn.remote_addr(), "connection error: {err}");
    }

    fn on_shutdown(&self, conn: &Connection) {
        info!(remote = %conn.remote_id(), "association shut down by peer");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::ERROR.into())
                .with_env_var("FMTP_LOG")
                .from_env_lossy(),
        )
        .init();

    let id = std::env::var("FMTP_ID").unwrap_or_else(|_| "FMTPD".to_owned());
    let bind = std::env::var("FMTP_BIND").unwrap_or_else(|_| "127.0.0.1:8500".to_owned());
    let addr: SocketAddr = bind.parse().context("invalid FMTP_BIND address")?;

    let client = Client::new(FmtpIdentifier::new(id.into_bytes())?);
    let server = client
        .new_server(addr, Arc::new(LogHandler))
        .with_notify_conn(|peer, remote| info!(%peer, %remote, "peer connected"));

    server.listen_and_serve().await?;
    Ok(())
}
