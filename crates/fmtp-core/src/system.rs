/// The control signals carried in the body of a System frame as two ASCII
/// digits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SystemSignal {
    /// `01`: opens an association.
    Startup,
    /// `00`: closes an association.
    Shutdown,
    /// `03`: keeps an idle association alive.
    Heartbeat,
}

impl SystemSignal {
    /// The 2-byte wire form.
    #[must_use]
    pub fn encode(self) -> &'static [u8; 2] {
        match self {
            SystemSignal::Startup => b"01",
            SystemSignal::Shutdown => b"00",
            SystemSignal::Heartbeat => b"03",
        }
    }

    /// Decodes a System frame body. Returns `None` for any body that is not
    /// one of the three known signals; such frames are ignored.
    #[must_use]
    pub fn decode(b: &[u8]) -> Option<Self> {
        [
            SystemSignal::Startup,
            SystemSignal::Shutdown,
            SystemSignal::Heartbeat,
        ]
        .into_iter()
        .find(|sig| b == sig.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signals_round_trip() {
        for sig in [
            SystemSignal::Startup,
            SystemSignal::Shutdown,
            SystemSignal::Heartbeat,
        ] {
            assert_eq!(SystemSignal::decode(sig.encode()), Some(sig));
        }
    }

    #[test]
    fn unknown_bodies_are_ignored() {
        assert_eq!(SystemSignal::decode(b"02"), None);
        assert_eq!(SystemSignal::decode(b"0"), None);
        assert_eq!(SystemSignal::decode(b"013"), None);
        assert_eq!(SystemSignal::decode(b""), None);
    }
}
