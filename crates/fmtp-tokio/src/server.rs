use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fmtp_core::FmtpIdentifier;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::Client;
use crate::connection::Connection;
use crate::handler::Handler;
use crate::handshake;

type AcceptTcpFn = Arc<dyn Fn(SocketAddr) -> bool + Send + Sync>;
type AcceptRemoteFn = Arc<dyn Fn(&FmtpIdentifier) -> bool + Send + Sync>;
type NotifyConnFn = Arc<dyn Fn(SocketAddr, &FmtpIdentifier) + Send + Sync>;

const ACCEPT_RETRY_MIN: Duration = Duration::from_millis(5);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Accepts incoming FMTP connections on behalf of a [`Client`].
///
/// Each accepted socket goes through the responder side of the
/// identification exchange; surviving connections are registered in the
/// client's registry and served by their own supervisor.
#[derive(Clone)]
pub struct Server {
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    accept_tcp: Option<AcceptTcpFn>,
    accept_remote: Option<AcceptRemoteFn>,
    notify_conn: Option<NotifyConnFn>,
    client: Client,
}

impl Server {
    pub(crate) fn new(client: Client, addr: SocketAddr, handler: Arc<dyn Handler>) -> Self {
        Self {
            addr,
            handler,
            accept_tcp: None,
            accept_remote: None,
            notify_conn: None,
            client,
        }
    }

    /// Filters inbound TCP connections by peer address before any FMTP
    /// traffic is exchanged. Without a filter every address is accepted.
    #[must_use]
    pub fn with_accept_tcp(mut self, f: impl Fn(SocketAddr) -> bool + Send + Sync + 'static) -> Self {
        self.accept_tcp = Some(Arc::new(f));
        self
    }

    /// Decides whether a peer identifier may connect. Without a predicate
    /// every identifier is accepted.
    #[must_use]
    pub fn with_accept_remote(
        mut self,
        f: impl Fn(&FmtpIdentifier) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.accept_remote = Some(Arc::new(f));
        self
    }

    /// Called once for every successfully established connection.
    #[must_use]
    pub fn with_notify_conn(
        mut self,
        f: impl Fn(SocketAddr, &FmtpIdentifier) + Send + Sync + 'static,
    ) -> Self {
        self.notify_conn = Some(Arc::new(f));
        self
    }

    /// Binds the configured address and serves forever.
    ///
    /// # Errors
    /// Returns the error that prevented binding.
    pub async fn listen_and_serve(&self) -> Result<(), fmtp_core::FmtpError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("listening on {}", self.addr);
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// Transient accept errors are retried with an exponential delay
    /// instead of ending the loop.
    ///
    /// # Errors
    /// Currently never returns; the signature leaves room for a graceful
    /// shutdown path.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), fmtp_core::FmtpError> {
        let mut retry_delay = Duration::ZERO;
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    retry_delay = if retry_delay.is_zero() {
                        ACCEPT_RETRY_MIN
                    } else {
                        (retry_delay * 2).min(ACCEPT_RETRY_MAX)
                    };
                    warn!("accept error: {e}; retrying in {retry_delay:?}");
                    sleep(retry_delay).await;
                    continue;
                }
            };
            retry_delay = Duration::ZERO;

            if let Some(accept_tcp) = &self.accept_tcp {
                if !accept_tcp(peer) {
                    debug!(%peer, "refusing tcp connection");
                    continue;
                }
            }

            let server = self.clone();
            tokio::spawn(async move {
                server.handle_incoming(stream, peer).await;
            });
        }
    }

    async fn handle_incoming(self, mut stream: TcpStream, peer: SocketAddr) {
        // correlation id for everything logged before the peer names itself
        let conn_id = Uuid::new_v4();
        debug!(%peer, conn = %conn_id, "incoming tcp connection");

        let accept = |remote: &FmtpIdentifier| {
            self.accept_remote.as_ref().is_none_or(|f| f(remote))
        };
        let remote = match handshake::respond(
            &mut stream,
            self.client.local_id(),
            self.client.timers().ti,
            accept,
        )
        .await
        {
            Ok(remote) => remote,
            Err(e) => {
                warn!(%peer, conn = %conn_id, "handshake failed: {e}");
                return;
            }
        };

        let conn = Connection::spawn(
            stream,
            Some(peer),
            self.client.local_id().clone(),
            remote.clone(),
            self.client.timers(),
            Some(self.handler.clone()),
            Some(self.client.registry()),
        );
        if let Err(e) = self.client.register(&conn).await {
            warn!(%peer, remote = %remote, conn = %conn_id, "refusing connection: {e}");
            conn.close();
            return;
        }

        info!(%peer, remote = %remote, conn = %conn_id, "fmtp connection established");
        if let Some(notify) = &self.notify_conn {
            notify(peer, &remote);
        }
    }
}
