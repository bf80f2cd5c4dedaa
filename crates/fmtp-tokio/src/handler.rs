use fmtp_core::{FmtpError, FmtpMessage};

use crate::Connection;

/// Receives messages and lifecycle notifications for a connection.
///
/// All callbacks run on the connection's supervisor task: a handler that
/// blocks stalls that one connection, so anything slow should be moved to
/// its own task with a clone of the [`Connection`] handle.
pub trait Handler: Send + Sync + 'static {
    /// Called for every Operational or Operator message received over an
    /// open association.
    fn on_message(&self, conn: &Connection, msg: FmtpMessage);

    /// Called when the connection tears down on an error, or when the
    /// association times out (Tr).
    fn on_error(&self, conn: &Connection, err: &FmtpError) {
        let _ = (conn, err);
    }

    /// Called when the peer shuts the association down.
    fn on_shutdown(&self, conn: &Connection) {
        let _ = conn;
    }
}

/// Plain functions and closures act as message handlers.
impl<F> Handler for F
where
    F: Fn(&Connection, FmtpMessage) + Send + Sync + 'static,
{
    fn on_message(&self, conn: &Connection, msg: FmtpMessage) {
        self(conn, msg);
    }
}
