use std::time::Instant;

use tracing::warn;

use crate::{FmtpMessage, FmtpPacket, FmtpType, SystemSignal};

/// Orders issued by the local user against an association.
///
/// These correspond to the MT-ASSOC, MT-STOP and MT-DATA service primitives
/// of the FMTP specification; connection release (MT-DIS) is handled by the
/// supervisor outside the state machine.
#[derive(Debug)]
pub enum UserCommand {
    /// Open an association over the established connection.
    Associate { now: Instant },

    /// Close the association without releasing the connection.
    Deassociate { now: Instant },

    /// Transmit a message over the association.
    Send { now: Instant, msg: FmtpMessage },
}

/// Inputs that drive the association state machine: frames received from
/// the peer, timer expirations and user commands.
#[derive(Debug)]
pub enum Event {
    /// A STARTUP signal has been received.
    RStartup { now: Instant },

    /// A SHUTDOWN signal has been received.
    RShutdown { now: Instant },

    /// A HEARTBEAT signal has been received.
    RHeartbeat { now: Instant },

    /// An Operational or Operator message has been received.
    RData { now: Instant, msg: FmtpMessage },

    /// A frame that carries no protocol meaning here: an unknown system
    /// signal, an identification frame after the handshake, or an unknown
    /// frame type. Still counts as reception for the Tr timer.
    RIgnored { now: Instant },

    /// The send-idle timer elapsed; a HEARTBEAT is due.
    TsExpired { now: Instant },

    /// The receive-idle timer elapsed; the peer has gone silent.
    TrExpired { now: Instant },

    /// An order from the local user.
    UserCommand(UserCommand),
}

impl Event {
    /// Classifies an inbound frame.
    ///
    /// Frames that the protocol does not expect at this layer (unknown
    /// system signals, identification frames once the handshake is over,
    /// unknown types) are mapped to [`Event::RIgnored`] with a warning
    /// rather than an error: the connection stays up and the frame counts
    /// as peer activity.
    #[must_use]
    pub fn from_packet(packet: FmtpPacket, now: Instant) -> Self {
        match packet.header.typ() {
            FmtpType::Operational | FmtpType::Operator => match packet.try_to_msg() {
                Ok(msg) => Self::RData { now, msg },
                // unreachable for these two types, but stay total
                Err(_) => Self::RIgnored { now },
            },
            FmtpType::System => match SystemSignal::decode(packet.body()) {
                Some(SystemSignal::Startup) => Self::RStartup { now },
                Some(SystemSignal::Shutdown) => Self::RShutdown { now },
                Some(SystemSignal::Heartbeat) => Self::RHeartbeat { now },
                None => {
                    warn!("ignoring unknown system signal: {packet}");
                    Self::RIgnored { now }
                }
            },
            FmtpType::Identification => {
                warn!("ignoring identification frame outside the handshake");
                Self::RIgnored { now }
            }
            FmtpType::Unknown(code) => {
                warn!("ignoring frame of unknown type {code}");
                Self::RIgnored { now }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FmtpError;

    #[test]
    fn classifies_system_signals() {
        let now = Instant::now();
        assert!(matches!(
            Event::from_packet(FmtpPacket::startup(), now),
            Event::RStartup { .. }
        ));
        assert!(matches!(
            Event::from_packet(FmtpPacket::shutdown(), now),
            Event::RShutdown { .. }
        ));
        assert!(matches!(
            Event::from_packet(FmtpPacket::heartbeat(), now),
            Event::RHeartbeat { .. }
        ));
    }

    #[test]
    fn classifies_user_data() {
        let now = Instant::now();
        let packet = FmtpPacket::from_msg(FmtpMessage::operator_str("HI").unwrap());
        let Event::RData { msg, .. } = Event::from_packet(packet, now) else {
            panic!("expected RData");
        };
        assert_eq!(msg.data(), b"HI");
    }

    #[test]
    fn unknown_frames_are_ignored_not_fatal() {
        let now = Instant::now();
        let unknown_signal =
            FmtpPacket::new(crate::FmtpType::System, b"99".as_slice()).unwrap();
        assert!(matches!(
            Event::from_packet(unknown_signal, now),
            Event::RIgnored { .. }
        ));

        let id_frame = FmtpPacket::accept();
        assert!(matches!(
            Event::from_packet(id_frame, now),
            Event::RIgnored { .. }
        ));

        let unknown_typ: Result<FmtpPacket, FmtpError> = FmtpPacket::new(
            crate::FmtpType::Unknown(9),
            b"?".as_slice(),
        );
        assert!(matches!(
            Event::from_packet(unknown_typ.unwrap(), now),
            Event::RIgnored { .. }
        ));
    }
}
