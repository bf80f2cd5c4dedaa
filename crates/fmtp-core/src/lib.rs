//! Sans-io model of the Flight Message Transfer Protocol (FMTP) v2.0.
//!
//! FMTP is a connection-oriented application-layer protocol (OSI layers
//! 5/6/7) used by air-traffic services to exchange Operational and Operator
//! messages between ground systems over a reliable byte stream.
//!
//! This crate contains everything that does not touch a socket: the frame
//! and payload codecs, the identification types exchanged during connection
//! establishment, and the association state machine driven by the
//! STARTUP/SHUTDOWN/HEARTBEAT system signals. The `fmtp-tokio` crate wires
//! it to TCP.

mod association;
mod config;
mod error;
mod event;
mod header;
mod identification;
mod identifier;
mod message;
mod packet;
mod system;

pub use association::{Association, AssociationContext, State};
pub use config::{DEFAULT_TI, DEFAULT_TR, DEFAULT_TS, Timers};
pub use error::FmtpError;
pub use event::{Event, UserCommand};
pub use header::{COMPAT_BODY_LEN, FmtpType, HEADER_LEN, Header, MAX_BODY_LEN};
pub use identification::{IdRequest, IdResponse};
pub use identifier::FmtpIdentifier;
pub use message::FmtpMessage;
pub use packet::FmtpPacket;
pub use system::SystemSignal;

use std::time::Instant;

/// Deadline of the receive-idle timer: the latest point by which the peer
/// must have produced a frame while an association is up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tr(pub Instant);

/// Deadline of the send-idle timer: the point at which a HEARTBEAT is due
/// if nothing else has been transmitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ts(pub Instant);
