//! Tokio-based endpoint for the Flight Message Transfer Protocol (FMTP).
//!
//! Builds the runtime half of the protocol on top of the sans-io
//! `fmtp-core` crate: a framing reader task, the identification exchange
//! over TCP, a per-connection supervisor that owns the byte stream and the
//! association state, and the [`Client`]/[`Server`] surface with a registry
//! of live connections keyed by peer identifier.
//!
//! A minimal exchange looks like this: one side runs a [`Server`] built
//! from its [`Client`], the other dials with [`Client::dial`] and then
//! calls [`Connection::send`]. Messages arrive at the peer's [`Handler`].
//!
//! See `examples/client.rs` and the `fmtpd` binary for complete endpoints.

mod client;
mod connection;
mod framer;
mod handler;
mod handshake;
mod server;

pub use client::Client;
pub use connection::Connection;
pub use handler::Handler;
pub use server::Server;
