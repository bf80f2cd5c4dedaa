use std::fmt::{self, Display};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, big_endian::U16};

use crate::FmtpError;

/// FMTP protocol version emitted on the wire. Any version is accepted on
/// ingress for forward compatibility.
const VERSION_2: u8 = 2;

/// Value of the reserved header field on emission.
const RESERVED: u8 = 0;

/// Length of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 5;

/// Maximum body length of a single frame, as limited by the 16-bit length
/// field which counts the header as well.
pub const MAX_BODY_LEN: usize = u16::MAX as usize - HEADER_LEN;

/// Minimum body size every FMTP implementation is required to accept.
pub const COMPAT_BODY_LEN: usize = 10240;

/// The type of the message carried in a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FmtpType {
    /// Operational message (machine-readable, e.g. OLDI messages)
    Operational,
    /// Operator message (human-readable operator communication)
    Operator,
    /// Identification message (connection handshaking)
    Identification,
    /// System message (protocol control signals)
    System,
    /// A type code this implementation does not know. Admitted on ingress
    /// and ignored by the connection supervisor.
    Unknown(u8),
}

impl FmtpType {
    /// The wire code of this type.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            FmtpType::Operational => 1,
            FmtpType::Operator => 2,
            FmtpType::Identification => 3,
            FmtpType::System => 4,
            FmtpType::Unknown(code) => code,
        }
    }

    /// Maps a wire code back to a type.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => FmtpType::Operational,
            2 => FmtpType::Operator,
            3 => FmtpType::Identification,
            4 => FmtpType::System,
            other => FmtpType::Unknown(other),
        }
    }
}

impl Display for FmtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FmtpType::Operational => write!(f, "Operational"),
            FmtpType::Operator => write!(f, "Operator"),
            FmtpType::Identification => write!(f, "Identification"),
            FmtpType::System => write!(f, "System"),
            FmtpType::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

/// The fixed 5-byte frame header.
///
/// Layout on the wire: version, reserved, 2-byte big-endian length (header
/// and body combined), type code. The type code is kept raw so that
/// unknown codes survive decoding.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C, packed)]
pub struct Header {
    version: u8,
    reserved: u8,
    length: U16,
    typ: u8,
}

impl Header {
    /// Creates a header for a body of `body_len` bytes, in version 2.
    ///
    /// # Errors
    /// Returns [`FmtpError::BodyTooLarge`] if the body would not fit the
    /// 16-bit length field.
    pub fn new(typ: FmtpType, body_len: usize) -> Result<Self, FmtpError> {
        if body_len > MAX_BODY_LEN {
            return Err(FmtpError::BodyTooLarge { len: body_len });
        }
        #[expect(clippy::cast_possible_truncation, reason = "length checked above")]
        let length = (HEADER_LEN + body_len) as u16;
        Ok(Self {
            version: VERSION_2,
            reserved: RESERVED,
            length: U16::new(length),
            typ: typ.code(),
        })
    }

    /// Encodes the header into its 5-byte wire form.
    ///
    /// # Errors
    /// Returns [`FmtpError::InvalidHeader`] if the indicated length is
    /// smaller than the header itself.
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], FmtpError> {
        if (self.length.get() as usize) < HEADER_LEN {
            return Err(FmtpError::InvalidHeader(format!(
                "indicated length {} is smaller than the header",
                self.length.get()
            )));
        }
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(self.as_bytes());
        Ok(out)
    }

    /// Decodes a header from exactly 5 bytes.
    ///
    /// Any version and any type code are admitted; only the length field is
    /// validated.
    ///
    /// # Errors
    /// Returns [`FmtpError::InvalidHeader`] on a wrong input size or an
    /// indicated length smaller than the header.
    pub fn decode(b: &[u8]) -> Result<Self, FmtpError> {
        let header = Header::read_from_bytes(b).map_err(|_| {
            FmtpError::InvalidHeader(format!("expected {HEADER_LEN} bytes, got {}", b.len()))
        })?;
        if (header.length.get() as usize) < HEADER_LEN {
            return Err(FmtpError::InvalidHeader(format!(
                "indicated length {} is smaller than the header",
                header.length.get()
            )));
        }
        Ok(header)
    }

    /// Protocol version carried by this header.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Combined length of header and body in bytes.
    #[must_use]
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// The message type carried by this frame.
    #[must_use]
    pub fn typ(&self) -> FmtpType {
        FmtpType::from_code(self.typ)
    }

    /// Number of body bytes following the header.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.length.get() as usize - HEADER_LEN
    }
}
