use std::fmt::{self, Display};
use std::ops::Deref;

use crate::FmtpError;

/// An FMTP identification value.
///
/// Identifiers name the two endpoints during connection establishment and
/// key the client's registry of live connections. A valid identifier is
/// 1 to 32 bytes of ASCII.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FmtpIdentifier(Vec<u8>);

impl FmtpIdentifier {
    /// Creates a new identifier from the given bytes.
    ///
    /// # Errors
    /// Returns [`FmtpError::InvalidIdentifier`] if the input is empty,
    /// longer than 32 bytes, or contains non-ASCII bytes.
    pub fn new(id: impl Into<Vec<u8>>) -> Result<Self, FmtpError> {
        let id = id.into();
        if id.is_empty() || id.len() > 32 {
            return Err(FmtpError::InvalidIdentifier(format!(
                "must be 1..=32 bytes long, got {}",
                id.len()
            )));
        }
        if !id.is_ascii() {
            return Err(FmtpError::InvalidIdentifier(
                "must only contain bytes in the ASCII range".to_owned(),
            ));
        }
        Ok(Self(id))
    }
}

impl Deref for FmtpIdentifier {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for FmtpIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ascii() {
        let id = FmtpIdentifier::new("EDYY".as_bytes()).unwrap();
        assert_eq!(&*id, b"EDYY");
        assert_eq!(id.to_string(), "EDYY");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            FmtpIdentifier::new(b"".to_vec()),
            Err(FmtpError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn rejects_overlong() {
        assert!(FmtpIdentifier::new(vec![b'A'; 33]).is_err());
        assert!(FmtpIdentifier::new(vec![b'A'; 32]).is_ok());
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(FmtpIdentifier::new("münchen".as_bytes().to_vec()).is_err());
    }
}
