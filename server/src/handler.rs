use std::fmt;
use thiserror::Error;

/// Identifies a connection for the lifetime of a [crate::Server].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned by a [Handler] while processing input.
///
/// The error is logged and the connection stays open.
#[derive(Error, Debug)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Application protocol served over established sessions.
///
/// One handler is shared by every connection. Calls for a single connection are
/// serialized, but calls for different connections may run concurrently.
pub trait Handler: Send + Sync + 'static {
    /// Processes one decrypted message, returning the response to send (if any).
    fn handle_input(&self, id: ConnectionId, data: &str) -> Result<Option<String>, HandlerError>;

    /// Called once a connection is ready for application messages.
    ///
    /// The returned greeting (if any) is sent to the peer.
    fn on_connection(&self, _id: ConnectionId) -> Option<String> {
        None
    }

    /// Called once a connection has been torn down by the server.
    ///
    /// Not called for connections returned by [Handler::take_disconnected].
    fn on_disconnect(&self, _id: ConnectionId) {}

    /// Returns (and clears) the connections the handler wants closed.
    ///
    /// Consulted after every call to [Handler::handle_input].
    fn take_disconnected(&self) -> Vec<ConnectionId> {
        Vec::new()
    }
}
