use std::fmt::{self, Display};
use std::io::{Read, Write};

use tracing::trace;
use zerocopy::IntoBytes as _;

use crate::{
    FmtpError, FmtpIdentifier, FmtpMessage, FmtpType, HEADER_LEN, Header, IdRequest, IdResponse,
    MAX_BODY_LEN, SystemSignal,
};

/// A complete FMTP frame: the 5-byte header followed by up to 65 530 body
/// bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FmtpPacket {
    pub header: Header,
    body: Vec<u8>,
}

impl FmtpPacket {
    /// Creates a new frame of the given type.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] if the body exceeds the frame
    /// maximum.
    pub fn new(typ: FmtpType, body: impl Into<Vec<u8>>) -> Result<Self, FmtpError> {
        let body = body.into();
        let header = Header::new(typ, body.len())?;
        Ok(Self { header, body })
    }

    /// Assembles a frame from an already decoded header and its body. The
    /// body must have the length the header indicates.
    #[must_use]
    pub fn from_parts(header: Header, body: Vec<u8>) -> Self {
        debug_assert_eq!(header.body_len(), body.len());
        Self { header, body }
    }

    /// The frame body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts the frame into its wire bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend(self.body);
        out
    }

    /// Writes the frame to a byte stream as a single buffered write.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] for an oversized body and
    /// [`FmtpError::Io`] on transport failure.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), FmtpError> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(FmtpError::BodyTooLarge { len: self.body.len() });
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body.len());
        buf.extend_from_slice(&self.header.encode()?);
        buf.extend_from_slice(&self.body);
        w.write_all(&buf)?;
        w.flush()?;
        Ok(())
    }

    /// Reads exactly one frame from a byte stream: 5 header bytes, then the
    /// body length the header indicates. Never reads past the frame.
    ///
    /// # Errors
    /// Returns [`FmtpError::ShortRead`] if the stream ends mid-frame,
    /// [`FmtpError::InvalidHeader`] on a malformed header and
    /// [`FmtpError::Io`] on transport failure.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, FmtpError> {
        let mut head = [0u8; HEADER_LEN];
        r.read_exact(&mut head).map_err(map_eof)?;
        let header = Header::decode(&head)?;

        let mut body = vec![0u8; header.body_len()];
        r.read_exact(&mut body).map_err(map_eof)?;
        Ok(Self { header, body })
    }

    /// Wraps a user message into its frame.
    #[expect(
        clippy::missing_panics_doc,
        reason = "message length is validated at construction"
    )]
    #[must_use]
    pub fn from_msg(msg: FmtpMessage) -> Self {
        let (typ, body) = match msg {
            FmtpMessage::Operational(body) => (FmtpType::Operational, body),
            FmtpMessage::Operator(body) => (FmtpType::Operator, body),
        };
        // length is safe, FmtpMessage enforces the same bound
        let packet = FmtpPacket::new(typ, body).unwrap();
        trace!("data packet: {packet}");

        packet
    }

    /// Recovers the user message from an Operational or Operator frame.
    ///
    /// # Errors
    /// Returns [`FmtpError::ProtocolViolation`] for any other frame type.
    pub fn try_to_msg(self) -> Result<FmtpMessage, FmtpError> {
        match self.header.typ() {
            FmtpType::Operational => Ok(FmtpMessage::Operational(self.body)),
            FmtpType::Operator => Ok(FmtpMessage::Operator(self.body)),
            typ => Err(FmtpError::ProtocolViolation(format!(
                "{typ} frame carries no user message"
            ))),
        }
    }

    /// Creates the identification request frame sent during connection
    /// establishment.
    #[expect(
        clippy::missing_panics_doc,
        reason = "identifier lengths are validated at construction"
    )]
    #[must_use]
    pub fn id_request(sender: &FmtpIdentifier, receiver: &FmtpIdentifier) -> Self {
        let body = IdRequest::new(sender.clone(), receiver.clone()).encode();
        // encoding and length are safe
        let packet = FmtpPacket::new(FmtpType::Identification, body).unwrap();
        trace!("identification request packet: {packet}");

        packet
    }

    /// Creates an identification ACCEPT frame.
    #[expect(clippy::missing_panics_doc, reason = "payload is static")]
    #[must_use]
    pub fn accept() -> Self {
        let packet =
            FmtpPacket::new(FmtpType::Identification, IdResponse::new(true).encode()).unwrap();
        trace!("identification accept packet: {packet}");

        packet
    }

    /// Creates an identification REJECT frame.
    #[expect(clippy::missing_panics_doc, reason = "payload is static")]
    #[must_use]
    pub fn reject() -> Self {
        let packet =
            FmtpPacket::new(FmtpType::Identification, IdResponse::new(false).encode()).unwrap();
        trace!("identification reject packet: {packet}");

        packet
    }

    /// Creates a System frame carrying the given signal.
    #[expect(clippy::missing_panics_doc, reason = "payload is static")]
    #[must_use]
    pub fn system(signal: SystemSignal) -> Self {
        let packet = FmtpPacket::new(FmtpType::System, signal.encode().as_slice()).unwrap();
        trace!("system packet: {packet}");

        packet
    }

    /// Creates a STARTUP frame.
    #[must_use]
    pub fn startup() -> Self {
        Self::system(SystemSignal::Startup)
    }

    /// Creates a SHUTDOWN frame.
    #[must_use]
    pub fn shutdown() -> Self {
        Self::system(SystemSignal::Shutdown)
    }

    /// Creates a HEARTBEAT frame.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::system(SystemSignal::Heartbeat)
    }

    /// Reports whether this frame is a HEARTBEAT.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.header.typ() == FmtpType::System
            && SystemSignal::decode(&self.body) == Some(SystemSignal::Heartbeat)
    }
}

fn map_eof(e: std::io::Error) -> FmtpError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FmtpError::ShortRead
    } else {
        FmtpError::Io(e)
    }
}

impl Display for FmtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.header.typ(),
            String::from_utf8_lossy(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_message_wire_form() {
        let msg = FmtpMessage::operator_str("HELLO").unwrap();
        let mut buf = Vec::new();
        FmtpPacket::from_msg(msg).write_to(&mut buf).unwrap();
        assert_eq!(buf, [0x02, 0x00, 0x00, 0x0A, 0x02, b'H', b'E', b'L', b'L', b'O']);
    }

    #[test]
    fn write_then_read_round_trips() {
        let packet = FmtpPacket::new(FmtpType::Operational, b"payload".as_slice()).unwrap();
        let mut buf = Vec::new();
        packet.write_to(&mut buf).unwrap();

        let read = FmtpPacket::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(read, packet);
        assert_eq!(read.header.typ(), FmtpType::Operational);
        assert_eq!(read.body(), b"payload");
    }

    #[test]
    fn empty_body_round_trips() {
        let packet = FmtpPacket::new(FmtpType::System, Vec::new()).unwrap();
        let mut buf = Vec::new();
        packet.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(FmtpPacket::read_from(&mut buf.as_slice()).unwrap(), packet);
    }

    #[test]
    fn read_fails_on_truncated_header() {
        let mut input: &[u8] = &[0x02, 0x00, 0x00];
        assert!(matches!(
            FmtpPacket::read_from(&mut input),
            Err(FmtpError::ShortRead)
        ));
    }

    #[test]
    fn read_fails_on_truncated_body() {
        // header promises 5 body bytes, only 2 follow
        let mut input: &[u8] = &[0x02, 0x00, 0x00, 0x0A, 0x01, b'A', b'B'];
        assert!(matches!(
            FmtpPacket::read_from(&mut input),
            Err(FmtpError::ShortRead)
        ));
    }

    #[test]
    fn read_does_not_consume_past_one_frame() {
        let mut buf = Vec::new();
        FmtpPacket::startup().write_to(&mut buf).unwrap();
        FmtpPacket::shutdown().write_to(&mut buf).unwrap();

        let mut cursor = buf.as_slice();
        let first = FmtpPacket::read_from(&mut cursor).unwrap();
        assert_eq!(first.body(), b"01");
        let second = FmtpPacket::read_from(&mut cursor).unwrap();
        assert_eq!(second.body(), b"00");
        assert!(cursor.is_empty());
    }

    #[test]
    fn system_payloads() {
        assert_eq!(FmtpPacket::startup().body(), b"01");
        assert_eq!(FmtpPacket::shutdown().body(), b"00");
        assert_eq!(FmtpPacket::heartbeat().body(), b"03");
        assert!(FmtpPacket::heartbeat().is_heartbeat());
        assert!(!FmtpPacket::startup().is_heartbeat());
    }

    #[test]
    fn identification_payloads() {
        let sender = FmtpIdentifier::new(b"AAA".as_slice()).unwrap();
        let receiver = FmtpIdentifier::new(b"BBB".as_slice()).unwrap();
        let packet = FmtpPacket::id_request(&sender, &receiver);
        assert_eq!(packet.header.typ(), FmtpType::Identification);
        assert_eq!(packet.body(), b"AAA-BBB");
        assert_eq!(FmtpPacket::accept().body(), b"ACCEPT");
        assert_eq!(FmtpPacket::reject().body(), b"REJECT");
    }

    #[test]
    fn user_message_conversion() {
        let msg = FmtpMessage::operational(b"DATA".to_vec()).unwrap();
        let packet = FmtpPacket::from_msg(msg.clone());
        assert_eq!(packet.try_to_msg().unwrap(), msg);
        assert!(FmtpPacket::startup().try_to_msg().is_err());
    }
}
