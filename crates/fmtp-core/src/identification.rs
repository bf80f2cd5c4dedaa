use crate::{FmtpError, FmtpIdentifier};

const HYPHEN: u8 = b'-';

/// Maximum encoded length of an identification request: two 32-byte
/// identifiers and the separating hyphen.
const MAX_ID_REQUEST_LEN: usize = 32 + 1 + 32;

const ACCEPT: &[u8] = b"ACCEPT";
const REJECT: &[u8] = b"REJECT";
const RESPONSE_LEN: usize = 6;

/// The identification request exchanged during connection establishment.
///
/// On the wire this is `<sender>-<receiver>` with exactly one hyphen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdRequest {
    /// Identification of the sending system.
    pub sender: FmtpIdentifier,
    /// Identification of the receiving system.
    pub receiver: FmtpIdentifier,
}

impl IdRequest {
    /// Creates an identification request.
    #[must_use]
    pub fn new(sender: FmtpIdentifier, receiver: FmtpIdentifier) -> Self {
        Self { sender, receiver }
    }

    /// Encodes the request as `<sender>-<receiver>`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.sender.len() + 1 + self.receiver.len());
        out.extend_from_slice(&self.sender);
        out.push(HYPHEN);
        out.extend_from_slice(&self.receiver);
        out
    }

    /// Decodes an identification request body.
    ///
    /// # Errors
    /// Returns [`FmtpError::ProtocolViolation`] if the body is overlong or
    /// does not contain exactly one hyphen, and
    /// [`FmtpError::InvalidIdentifier`] if either half is not a valid
    /// identifier.
    pub fn decode(b: &[u8]) -> Result<Self, FmtpError> {
        if b.len() > MAX_ID_REQUEST_LEN {
            return Err(FmtpError::ProtocolViolation(format!(
                "identification request of {} bytes exceeds the maximum of {MAX_ID_REQUEST_LEN}",
                b.len()
            )));
        }
        let mut halves = b.split(|&c| c == HYPHEN);
        let (Some(sender), Some(receiver), None) = (halves.next(), halves.next(), halves.next())
        else {
            return Err(FmtpError::ProtocolViolation(
                "identification request must contain exactly one hyphen".to_owned(),
            ));
        };
        Ok(Self {
            sender: FmtpIdentifier::new(sender.to_vec())?,
            receiver: FmtpIdentifier::new(receiver.to_vec())?,
        })
    }

    /// Reports whether the request names the expected endpoints.
    #[must_use]
    pub fn matches(&self, sender: &FmtpIdentifier, receiver: &FmtpIdentifier) -> bool {
        self.sender == *sender && self.receiver == *receiver
    }
}

/// The identification response: the literal `ACCEPT` or `REJECT`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdResponse {
    pub accepted: bool,
}

impl IdResponse {
    #[must_use]
    pub fn new(accepted: bool) -> Self {
        Self { accepted }
    }

    /// The 6-byte wire form.
    #[must_use]
    pub fn encode(self) -> &'static [u8] {
        if self.accepted { ACCEPT } else { REJECT }
    }

    /// Decodes an identification response body.
    ///
    /// # Errors
    /// Returns [`FmtpError::ProtocolViolation`] unless the input is exactly
    /// `ACCEPT` or `REJECT`.
    pub fn decode(b: &[u8]) -> Result<Self, FmtpError> {
        if b.len() != RESPONSE_LEN {
            return Err(FmtpError::ProtocolViolation(format!(
                "identification response must be {RESPONSE_LEN} bytes, got {}",
                b.len()
            )));
        }
        match b {
            _ if b == ACCEPT => Ok(Self { accepted: true }),
            _ if b == REJECT => Ok(Self { accepted: false }),
            _ => Err(FmtpError::ProtocolViolation(
                "identification response is neither ACCEPT nor REJECT".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> FmtpIdentifier {
        FmtpIdentifier::new(s.as_bytes()).unwrap()
    }

    #[test]
    fn request_round_trips() {
        let req = IdRequest::new(id("AAA"), id("BBB"));
        let bin = req.encode();
        assert_eq!(bin, b"AAA-BBB");
        assert_eq!(IdRequest::decode(&bin).unwrap(), req);
    }

    #[test]
    fn request_validation() {
        let req = IdRequest::decode(b"AAA-BBB").unwrap();
        assert!(req.matches(&id("AAA"), &id("BBB")));
        assert!(!req.matches(&id("BBB"), &id("AAA")));
    }

    #[test]
    fn request_needs_exactly_one_hyphen() {
        assert!(IdRequest::decode(b"AAABBB").is_err());
        assert!(IdRequest::decode(b"AAA-BBB-CCC").is_err());
        assert!(IdRequest::decode(b"-BBB").is_err());
    }

    #[test]
    fn request_rejects_overlong() {
        let mut long = vec![b'A'; 40];
        long.push(b'-');
        long.extend_from_slice(&[b'B'; 40]);
        assert!(matches!(
            IdRequest::decode(&long),
            Err(FmtpError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn response_accepts_only_the_two_literals() {
        assert!(IdResponse::decode(b"ACCEPT").unwrap().accepted);
        assert!(!IdResponse::decode(b"REJECT").unwrap().accepted);
        assert!(IdResponse::decode(b"accept").is_err());
        assert!(IdResponse::decode(b"ACCEPTED").is_err());
        assert!(IdResponse::decode(b"ACCEP").is_err());
        assert!(IdResponse::decode(b"NOPE!!").is_err());
    }

    #[test]
    fn response_encoding() {
        assert_eq!(IdResponse::new(true).encode(), b"ACCEPT");
        assert_eq!(IdResponse::new(false).encode(), b"REJECT");
    }
}
