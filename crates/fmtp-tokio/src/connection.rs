//! The per-connection supervisor and its user-facing handle.
//!
//! One supervisor task runs per connection. It is the sole owner of the
//! write half and of the association state machine, so frames can never
//! interleave on the wire and no lock guards protocol state. Reads happen
//! on a companion task (see `framer`) that feeds two bounded channels.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fmtp_core::{
    Association, AssociationContext, Event, FmtpError, FmtpIdentifier, FmtpMessage, FmtpPacket,
    State, Timers, Tr, Ts, UserCommand,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::client::Registry;
use crate::framer;
use crate::handler::Handler;

const ORDER_QUEUE: usize = 64;

enum OrderKind {
    Associate,
    Deassociate,
    Send(FmtpMessage),
    Disconnect,
}

struct Order {
    kind: OrderKind,
    reply: oneshot::Sender<Result<(), FmtpError>>,
}

/// Handle to a live FMTP connection.
///
/// Cloning is cheap; all clones talk to the same supervisor. The blocking
/// calls resolve once the supervisor has acknowledged the order; bound
/// them with [`tokio::time::timeout`] if a deadline is needed. A caller
/// that gives up early does not undo the order: its effects on the
/// connection remain.
#[derive(Clone, Debug)]
pub struct Connection {
    orders: mpsc::Sender<Order>,
    shutdown: mpsc::Sender<()>,
    closed: Arc<AtomicBool>,
    id: Uuid,
    local: FmtpIdentifier,
    remote: FmtpIdentifier,
    remote_addr: Option<SocketAddr>,
}

impl Connection {
    /// Spawns the reader and supervisor tasks for an identified byte
    /// stream and returns the user handle.
    pub(crate) fn spawn<S>(
        stream: S,
        remote_addr: Option<SocketAddr>,
        local: FmtpIdentifier,
        remote: FmtpIdentifier,
        timers: Timers,
        handler: Option<Arc<dyn Handler>>,
        registry: Option<Registry>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (frames, frame_errs, reader) = framer::spawn_reader(read_half);
        let (orders_tx, orders_rx) = mpsc::channel(ORDER_QUEUE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = Self {
            orders: orders_tx,
            shutdown: shutdown_tx,
            closed: Arc::new(AtomicBool::new(false)),
            id: Uuid::new_v4(),
            local,
            remote,
            remote_addr,
        };

        let mut ctx = AssociationContext::default();
        let fsm = Association::new(timers, &mut ctx);
        let supervisor = Supervisor {
            writer: write_half,
            fsm,
            ctx,
            frames,
            frame_errs,
            orders: orders_rx,
            shutdown: shutdown_rx,
            reader,
            pending: Vec::new(),
            handler,
            registry,
            handle: handle.clone(),
        };
        tokio::spawn(supervisor.run());

        handle
    }

    /// Opens an association over this connection (STARTUP exchange).
    ///
    /// # Errors
    /// Fails with [`FmtpError::ConnectionClosing`] once the connection is
    /// tearing down, or with the transport error that broke it.
    pub async fn associate(&self) -> Result<(), FmtpError> {
        self.order(OrderKind::Associate).await
    }

    /// Closes the association, keeping the connection (SHUTDOWN).
    ///
    /// # Errors
    /// See [`Connection::associate`].
    pub async fn deassociate(&self) -> Result<(), FmtpError> {
        self.order(OrderKind::Deassociate).await
    }

    /// Sends a message, opening the association first if necessary.
    ///
    /// # Errors
    /// See [`Connection::associate`].
    pub async fn send(&self, msg: FmtpMessage) -> Result<(), FmtpError> {
        self.order(OrderKind::Send(msg)).await
    }

    /// Sends bytes as an Operator message.
    ///
    /// # Errors
    /// [`FmtpError::BodyTooLarge`] for an oversized payload, otherwise see
    /// [`Connection::associate`].
    pub async fn send_operator(&self, text: impl Into<Vec<u8>>) -> Result<(), FmtpError> {
        self.send(FmtpMessage::operator(text)?).await
    }

    /// Gracefully disconnects: closes the byte stream and stops the
    /// supervisor.
    ///
    /// # Errors
    /// See [`Connection::associate`].
    pub async fn disconnect(&self) -> Result<(), FmtpError> {
        self.order(OrderKind::Disconnect).await
    }

    /// Tears the connection down without any grace. Pending orders are
    /// answered with [`FmtpError::ConnectionClosing`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.try_send(());
    }

    /// The local endpoint's identifier.
    #[must_use]
    pub fn local_id(&self) -> &FmtpIdentifier {
        &self.local
    }

    /// The peer's identifier, as established during the handshake.
    #[must_use]
    pub fn remote_id(&self) -> &FmtpIdentifier {
        &self.remote
    }

    /// The peer's transport address, when the byte stream reports one.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub(crate) fn uuid(&self) -> Uuid {
        self.id
    }

    async fn order(&self, kind: OrderKind) -> Result<(), FmtpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FmtpError::ConnectionClosing);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.orders
            .send(Order {
                kind,
                reply: reply_tx,
            })
            .await
            .map_err(|_| FmtpError::ConnectionClosing)?;
        reply_rx.await.map_err(|_| FmtpError::ConnectionClosing)?
    }
}

enum PendingKind {
    Associate,
    Send(FmtpMessage),
}

/// An order that must wait for the peer's STARTUP before it can complete.
struct Pending {
    kind: PendingKind,
    reply: oneshot::Sender<Result<(), FmtpError>>,
}

struct Supervisor<S> {
    writer: WriteHalf<S>,
    fsm: Association,
    ctx: AssociationContext,
    frames: mpsc::Receiver<FmtpPacket>,
    frame_errs: mpsc::Receiver<FmtpError>,
    orders: mpsc::Receiver<Order>,
    shutdown: mpsc::Receiver<()>,
    reader: JoinHandle<()>,
    pending: Vec<Pending>,
    handler: Option<Arc<dyn Handler>>,
    registry: Option<Registry>,
    handle: Connection,
}

impl<S> Supervisor<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        debug!(conn = %self.handle.id, remote = %self.handle.remote, "supervisor started");
        loop {
            // transmit everything the machine queued, then deliver inbound
            // messages, before suspending again
            if let Err(e) = self.pump().await {
                self.fail(e).await;
                return;
            }
            self.deliver();

            if self.fsm.is_closed() {
                self.fail(FmtpError::ProtocolViolation(
                    "closing connection after protocol violation".to_owned(),
                ))
                .await;
                return;
            }

            if self.fsm.is_associated() && !self.pending.is_empty() && !self.flush_pending().await {
                return;
            }

            let deadlines = match self.fsm.state() {
                State::Associated {
                    tr: Tr(tr),
                    ts: Ts(ts),
                } => Some((*tr, *ts)),
                _ => None,
            };

            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    debug!(conn = %self.handle.id, "close signal received");
                    self.drain_orders();
                    self.teardown().await;
                    return;
                }

                order = self.orders.recv() => {
                    // the supervisor's own handle keeps the channel open
                    if let Some(order) = order {
                        if !self.handle_order(order).await {
                            return;
                        }
                    }
                }

                err = self.frame_errs.recv() => {
                    let e = err.unwrap_or(FmtpError::ShortRead);
                    self.fail(e).await;
                    return;
                }

                packet = self.frames.recv() => {
                    if let Some(packet) = packet {
                        let event = Event::from_packet(packet, Instant::now().into());
                        self.dispatch(&event);
                    }
                    // a closed frame channel means the reader stopped; its
                    // error arrives on frame_errs and is handled above
                }

                event = timer_expired(deadlines), if deadlines.is_some() => {
                    self.dispatch(&event);
                }
            }
        }
    }

    /// Feeds one event to the state machine and surfaces user-visible
    /// association drops.
    fn dispatch(&mut self, event: &Event) {
        let was_associated = self.fsm.is_associated();
        self.fsm.handle(event, &mut self.ctx);

        if was_associated && !self.fsm.is_associated() {
            match event {
                Event::TrExpired { .. } => {
                    warn!(
                        conn = %self.handle.id,
                        remote = %self.handle.remote,
                        "peer silent for Tr, association shut down"
                    );
                    self.notify_error(&FmtpError::AssociationTimeout);
                }
                Event::RShutdown { .. } => {
                    debug!(conn = %self.handle.id, "association shut down by peer");
                    if let Some(handler) = &self.handler {
                        handler.on_shutdown(&self.handle);
                    }
                }
                _ => {}
            }
        }
    }

    /// Writes out every frame the machine queued. Failure to send a
    /// HEARTBEAT is logged but tolerated: if the stream is truly dead the
    /// peer's Tr, or our own reader, will end the connection.
    async fn pump(&mut self) -> Result<(), FmtpError> {
        while let Some(packet) = self.ctx.poll_transmit() {
            trace!(conn = %self.handle.id, "transmitting: {packet}");
            let heartbeat = packet.is_heartbeat();
            let bytes = packet.into_bytes();
            if let Err(e) = self.writer.write_all(&bytes).await {
                if heartbeat {
                    warn!(conn = %self.handle.id, "could not send heartbeat: {e}");
                    continue;
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Hands received user messages to the handler.
    fn deliver(&mut self) {
        while let Some(msg) = self.ctx.poll_receive() {
            debug!(conn = %self.handle.id, remote = %self.handle.remote, "received {msg}");
            match &self.handler {
                Some(handler) => handler.on_message(&self.handle, msg),
                None => warn!(conn = %self.handle.id, "no handler set, dropping message"),
            }
        }
    }

    /// Processes one user order. Returns `false` when the supervisor must
    /// stop.
    async fn handle_order(&mut self, order: Order) -> bool {
        let now = Instant::now().into();
        match order.kind {
            OrderKind::Disconnect => {
                debug!(conn = %self.handle.id, remote = %self.handle.remote, "disconnecting");
                let _ = order.reply.send(Ok(()));
                self.drain_orders();
                self.teardown().await;
                false
            }
            OrderKind::Associate => {
                if self.fsm.is_associated() {
                    let _ = order.reply.send(Ok(()));
                    return true;
                }
                self.dispatch(&Event::UserCommand(UserCommand::Associate { now }));
                self.pending.push(Pending {
                    kind: PendingKind::Associate,
                    reply: order.reply,
                });
                true
            }
            OrderKind::Deassociate => {
                self.dispatch(&Event::UserCommand(UserCommand::Deassociate { now }));
                match self.pump().await {
                    Ok(()) => {
                        let _ = order.reply.send(Ok(()));
                        true
                    }
                    Err(e) => {
                        let _ = order.reply.send(Err(e));
                        self.abort().await;
                        false
                    }
                }
            }
            OrderKind::Send(msg) => {
                if self.fsm.is_associated() {
                    self.dispatch(&Event::UserCommand(UserCommand::Send { now, msg }));
                    match self.pump().await {
                        Ok(()) => {
                            let _ = order.reply.send(Ok(()));
                            true
                        }
                        Err(e) => {
                            let _ = order.reply.send(Err(e));
                            self.abort().await;
                            false
                        }
                    }
                } else {
                    // open the association first; the message goes out when
                    // the peer's STARTUP arrives
                    self.dispatch(&Event::UserCommand(UserCommand::Associate { now }));
                    self.pending.push(Pending {
                        kind: PendingKind::Send(msg),
                        reply: order.reply,
                    });
                    true
                }
            }
        }
    }

    /// Completes the orders that were waiting for the STARTUP ack, in
    /// arrival order. Returns `false` when the supervisor must stop.
    async fn flush_pending(&mut self) -> bool {
        for pending in std::mem::take(&mut self.pending) {
            if pending.reply.is_closed() {
                trace!(conn = %self.handle.id, "dropping order whose caller gave up");
                continue;
            }
            match pending.kind {
                PendingKind::Associate => {
                    let _ = pending.reply.send(Ok(()));
                }
                PendingKind::Send(msg) => {
                    let now = Instant::now().into();
                    self.dispatch(&Event::UserCommand(UserCommand::Send { now, msg }));
                    match self.pump().await {
                        Ok(()) => {
                            let _ = pending.reply.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = pending.reply.send(Err(e));
                            self.abort().await;
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    fn notify_error(&self, err: &FmtpError) {
        if let Some(handler) = &self.handler {
            handler.on_error(&self.handle, err);
        }
    }

    /// Answers every parked and queued order with `ConnectionClosing`.
    fn drain_orders(&mut self) {
        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(Err(FmtpError::ConnectionClosing));
        }
        while let Ok(order) = self.orders.try_recv() {
            let _ = order.reply.send(Err(FmtpError::ConnectionClosing));
        }
    }

    /// Terminal path for errors not yet delivered to anyone.
    async fn fail(&mut self, err: FmtpError) {
        error!(
            conn = %self.handle.id,
            remote = %self.handle.remote,
            addr = ?self.handle.remote_addr,
            "connection failed: {err}"
        );
        self.notify_error(&err);
        self.drain_orders();
        self.teardown().await;
    }

    /// Terminal path when the failing order already received its error.
    async fn abort(&mut self) {
        self.drain_orders();
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        let _ = self.writer.shutdown().await;
        if let Some(registry) = &self.registry {
            crate::client::unregister(registry, &self.handle).await;
        }
        debug!(conn = %self.handle.id, remote = %self.handle.remote, "supervisor stopped");
    }
}

/// Resolves when the earlier of the two association timers fires. Pends
/// forever outside an association.
async fn timer_expired(deadlines: Option<(std::time::Instant, std::time::Instant)>) -> Event {
    let Some((tr, ts)) = deadlines else {
        return std::future::pending().await;
    };
    tokio::select! {
        () = sleep_until(tr.into()) => Event::TrExpired { now: Instant::now().into() },
        () = sleep_until(ts.into()) => Event::TsExpired { now: Instant::now().into() },
    }
}
