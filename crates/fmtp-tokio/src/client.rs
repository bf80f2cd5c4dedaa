use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use fmtp_core::{FmtpError, FmtpIdentifier, Timers};
use tokio::net::{TcpSocket, TcpStream, ToSocketAddrs, lookup_host};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::handler::Handler;
use crate::handshake;
use crate::server::Server;

/// Live connections keyed by the peer's identifier. At most one connection
/// per remote identifier may be registered.
pub(crate) type Registry = Arc<Mutex<HashMap<FmtpIdentifier, Connection>>>;

/// An FMTP endpoint identity: the local identifier, the timer defaults
/// every connection inherits, and the registry of live connections.
///
/// Cloning is cheap and clones share the registry; a [`Server`] built with
/// [`Client::new_server`] registers the connections it accepts in the same
/// map that [`Client::connect`] uses.
#[derive(Clone)]
pub struct Client {
    id: FmtpIdentifier,
    timers: Timers,
    keepalive: bool,
    handler: Option<Arc<dyn Handler>>,
    conns: Registry,
}

impl Client {
    /// Creates a client with the default timers (Ti 12 s, Ts 60 s,
    /// Tr 120 s), TCP keep-alive off and no handler.
    #[must_use]
    pub fn new(id: FmtpIdentifier) -> Self {
        Self {
            id,
            timers: Timers::default(),
            keepalive: false,
            handler: None,
            conns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replaces the timer defaults for connections made after this call.
    #[must_use]
    pub fn with_timers(mut self, timers: Timers) -> Self {
        self.timers = timers;
        self
    }

    /// Enables or disables TCP keep-alive on dialed sockets. Off by
    /// default; production deployments should turn it on.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Sets the handler invoked for messages received over connections this
    /// client initiates.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The local identifier.
    #[must_use]
    pub fn local_id(&self) -> &FmtpIdentifier {
        &self.id
    }

    pub(crate) fn timers(&self) -> Timers {
        self.timers
    }

    pub(crate) fn registry(&self) -> Registry {
        self.conns.clone()
    }

    /// Establishes an FMTP connection: dials `addr`, runs the initiator
    /// side of the identification exchange against `remote`, registers the
    /// connection and starts its supervisor. No association is opened yet.
    ///
    /// # Errors
    /// Transport errors, every handshake failure of the identification
    /// exchange, and [`FmtpError::AlreadyRegistered`] when a live
    /// connection to `remote` exists.
    pub async fn connect(
        &self,
        addr: impl ToSocketAddrs,
        remote: FmtpIdentifier,
    ) -> Result<Connection, FmtpError> {
        let (mut stream, peer_addr) = self.dial_tcp(addr).await?;

        handshake::initiate(&mut stream, &self.id, &remote, self.timers.ti).await?;

        let conn = Connection::spawn(
            stream,
            Some(peer_addr),
            self.id.clone(),
            remote,
            self.timers,
            self.handler.clone(),
            Some(self.conns.clone()),
        );
        if let Err(e) = self.register(&conn).await {
            conn.close();
            return Err(e);
        }
        Ok(conn)
    }

    /// Connects and associates in one call.
    ///
    /// # Errors
    /// See [`Client::connect`]; an association failure closes the fresh
    /// connection before returning.
    pub async fn dial(
        &self,
        addr: impl ToSocketAddrs,
        remote: FmtpIdentifier,
    ) -> Result<Connection, FmtpError> {
        let conn = self.connect(addr, remote).await?;
        if let Err(e) = conn.associate().await {
            warn!(remote = %conn.remote_id(), "association failed after connect: {e}");
            conn.close();
            return Err(e);
        }
        Ok(conn)
    }

    /// Looks up the live connection to a peer, if any.
    pub async fn connection(&self, remote: &FmtpIdentifier) -> Option<Connection> {
        self.conns.lock().await.get(remote).cloned()
    }

    /// Creates a server that accepts FMTP connections on behalf of this
    /// client.
    #[must_use]
    pub fn new_server(&self, addr: SocketAddr, handler: Arc<dyn Handler>) -> Server {
        Server::new(self.clone(), addr, handler)
    }

    /// Tries every address `addr` resolves to, in order.
    async fn dial_tcp(
        &self,
        addr: impl ToSocketAddrs,
    ) -> Result<(TcpStream, SocketAddr), FmtpError> {
        let mut last_err = None;
        for candidate in lookup_host(addr).await? {
            match self.dial_tcp_one(candidate).await {
                Ok(stream) => return Ok((stream, candidate)),
                Err(e) => {
                    debug!("could not connect to {candidate}: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(FmtpError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to no candidates",
            )
        })))
    }

    async fn dial_tcp_one(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keepalive)?;
        socket.connect(addr).await
    }

    /// Registers a connection under its remote identifier.
    pub(crate) async fn register(&self, conn: &Connection) -> Result<(), FmtpError> {
        let mut conns = self.conns.lock().await;
        if conns.contains_key(conn.remote_id()) {
            return Err(FmtpError::AlreadyRegistered(conn.remote_id().clone()));
        }
        conns.insert(conn.remote_id().clone(), conn.clone());
        debug!(remote = %conn.remote_id(), "connection registered");
        Ok(())
    }
}

/// Removes a connection from the registry, unless a newer connection has
/// already taken its place.
pub(crate) async fn unregister(registry: &Registry, conn: &Connection) {
    let mut conns = registry.lock().await;
    if conns
        .get(conn.remote_id())
        .is_some_and(|live| live.uuid() == conn.uuid())
    {
        conns.remove(conn.remote_id());
        debug!(remote = %conn.remote_id(), "connection unregistered");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    use super::*;

    fn id(s: &str) -> FmtpIdentifier {
        FmtpIdentifier::new(s.as_bytes()).unwrap()
    }

    /// Spawns a supervisor over an in-memory stream, keeping the far half
    /// alive so the connection does not tear down on EOF.
    fn dummy_conn(client: &Client, remote: &str) -> (Connection, DuplexStream) {
        let (near, far) = tokio::io::duplex(1024);
        let conn = Connection::spawn(
            near,
            None,
            client.local_id().clone(),
            id(remote),
            Timers::default(),
            None,
            Some(client.registry()),
        );
        (conn, far)
    }

    #[tokio::test]
    async fn one_live_connection_per_remote() {
        let client = Client::new(id("LOCAL"));
        let (first, _keep_first) = dummy_conn(&client, "REMOTE");
        let (second, _keep_second) = dummy_conn(&client, "REMOTE");

        client.register(&first).await.unwrap();
        assert!(matches!(
            client.register(&second).await,
            Err(FmtpError::AlreadyRegistered(_))
        ));

        // closing the registered connection frees the slot
        first.close();
        timeout(Duration::from_secs(2), async {
            while client.connection(&id("REMOTE")).await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        client.register(&second).await.unwrap();
        assert!(client.connection(&id("REMOTE")).await.is_some());
    }

    #[tokio::test]
    async fn teardown_never_evicts_a_replacement() {
        let client = Client::new(id("LOCAL"));
        let (first, _keep_first) = dummy_conn(&client, "REMOTE");
        let (second, _keep_second) = dummy_conn(&client, "REMOTE");

        // the replacement is registered; the predecessor's teardown must
        // leave it alone
        client.register(&second).await.unwrap();
        unregister(&client.registry(), &first).await;
        assert!(client.connection(&id("REMOTE")).await.is_some());
    }

    #[tokio::test]
    async fn connect_to_nothing_fails_with_io() {
        let client = Client::new(id("LOCAL"));
        // port 1 on localhost is reliably closed
        let result = client.connect("127.0.0.1:1", id("REMOTE")).await;
        assert!(matches!(result, Err(FmtpError::Io(_))));
    }
}
