//! Dials an FMTP daemon and sends every stdin line as an Operator message.
//!
//!     cargo run --example client -- 127.0.0.1:8500 FMTPD

use std::sync::Arc;

use fmtp_core::{FmtpIdentifier, FmtpMessage};
use fmtp_tokio::{Client, Connection};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .with_env_var("FMTP_LOG")
                .from_env_lossy(),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:8500".to_owned());
    let remote = args.next().unwrap_or_else(|| "FMTPD".to_owned());

    let client = Client::new(FmtpIdentifier::new(b"CLIENT".as_slice())?).with_handler(Arc::new(
        |conn: &Connection, msg: FmtpMessage| {
            info!(remote = %conn.remote_id(), "received {msg}");
        },
    ));

    let conn = client
        .dial(addr.as_str(), FmtpIdentifier::new(remote.into_bytes())?)
        .await?;
    info!(remote = %conn.remote_id(), "connected and associated; type to send");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        conn.send(FmtpMessage::operator_str(&line)?).await?;
    }

    conn.disconnect().await?;
    Ok(())
}
