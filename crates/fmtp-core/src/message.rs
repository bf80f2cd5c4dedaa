use std::fmt::{self, Display};

use crate::{FmtpError, MAX_BODY_LEN};

/// A user-payload message, as handed to and delivered from an association.
///
/// Operational messages carry machine-readable operational data; Operator
/// messages carry human-readable operator text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FmtpMessage {
    Operational(Vec<u8>),
    Operator(Vec<u8>),
}

impl FmtpMessage {
    /// Creates an Operational message.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] if the payload does not fit a
    /// single frame.
    pub fn operational(data: impl Into<Vec<u8>>) -> Result<Self, FmtpError> {
        let data = data.into();
        if data.len() > MAX_BODY_LEN {
            return Err(FmtpError::BodyTooLarge { len: data.len() });
        }
        Ok(Self::Operational(data))
    }

    /// Creates an Operator message.
    ///
    /// The protocol expects Operator bodies to be printable ASCII; this is
    /// not enforced here, and peers that care must check on receipt.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] if the payload does not fit a
    /// single frame.
    pub fn operator(data: impl Into<Vec<u8>>) -> Result<Self, FmtpError> {
        let data = data.into();
        if data.len() > MAX_BODY_LEN {
            return Err(FmtpError::BodyTooLarge { len: data.len() });
        }
        Ok(Self::Operator(data))
    }

    /// Creates an Operator message from a string.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] if the text does not fit a
    /// single frame.
    pub fn operator_str(txt: &str) -> Result<Self, FmtpError> {
        Self::operator(txt.as_bytes().to_vec())
    }

    /// The message payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self {
            FmtpMessage::Operational(data) | FmtpMessage::Operator(data) => data,
        }
    }

    fn kind(&self) -> &str {
        match self {
            FmtpMessage::Operational(_) => "Operational",
            FmtpMessage::Operator(_) => "Operator",
        }
    }
}

impl Display for FmtpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), String::from_utf8_lossy(self.data()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_from_str() {
        let msg = FmtpMessage::operator_str("HELLO").unwrap();
        assert_eq!(msg.data(), b"HELLO");
        assert_eq!(msg.to_string(), "Operator: HELLO");
    }

    #[test]
    fn enforces_frame_maximum() {
        assert!(FmtpMessage::operational(vec![0u8; MAX_BODY_LEN]).is_ok());
        assert!(matches!(
            FmtpMessage::operational(vec![0u8; MAX_BODY_LEN + 1]),
            Err(FmtpError::BodyTooLarge { .. })
        ));
    }
}
