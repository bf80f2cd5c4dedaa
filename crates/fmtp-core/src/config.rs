use std::time::Duration;

/// Default connection-establishment deadline.
pub const DEFAULT_TI: Duration = Duration::from_secs(12);
/// Default send-idle (heartbeat) interval.
pub const DEFAULT_TS: Duration = Duration::from_secs(60);
/// Default receive-idle (association-liveness) interval.
pub const DEFAULT_TR: Duration = Duration::from_secs(120);

/// The three protocol timers of a connection.
///
/// Every connection inherits these from its client at spawn; `ti` only
/// governs the identification exchange, `ts` and `tr` only a running
/// association.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timers {
    /// Maximum time for each receive step of the identification exchange.
    pub ti: Duration,
    /// Maximum transmission silence before a HEARTBEAT is emitted.
    pub ts: Duration,
    /// Maximum reception silence before the peer is considered gone.
    pub tr: Duration,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            ti: DEFAULT_TI,
            ts: DEFAULT_TS,
            tr: DEFAULT_TR,
        }
    }
}
