use thiserror::Error;

use crate::FmtpIdentifier;

/// Errors surfaced by the FMTP endpoint library.
///
/// Codec and framer errors are returned to their caller unchanged; errors
/// hit during connection establishment abort the attempt and release the
/// partially built connection.
#[derive(Debug, Error)]
pub enum FmtpError {
    /// An identifier failed validation at construction.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A 5-byte header could not be decoded or carried an illegal length.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A message body exceeds the wire maximum of 65 530 bytes.
    #[error("message body of {len} bytes exceeds the frame maximum")]
    BodyTooLarge { len: usize },

    /// The byte stream ended in the middle of a frame.
    #[error("byte stream ended mid-frame")]
    ShortRead,

    /// A frame or payload that the protocol does not allow in the current
    /// state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The identification exchange did not complete within Ti.
    #[error("connection deadline (Ti) exceeded")]
    ConnectionDeadlineExceeded,

    /// The local endpoint refused the peer's identification.
    #[error("connection rejected by local endpoint")]
    RejectedByLocal,

    /// The remote endpoint answered the identification with REJECT.
    #[error("connection rejected by remote endpoint")]
    RejectedByRemote,

    /// Nothing was received from the peer within Tr; the association has
    /// been shut down.
    #[error("association receive timeout (Tr) expired")]
    AssociationTimeout,

    /// The connection is tearing down and no longer takes orders.
    #[error("connection is closing")]
    ConnectionClosing,

    /// A live connection to this remote identifier already exists.
    #[error("a connection to {0} is already registered")]
    AlreadyRegistered(FmtpIdentifier),

    /// Transport failure on the underlying byte stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
