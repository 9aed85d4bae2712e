//! Error type shared by both RCON client implementations.

use thiserror::Error;

/// Errors that can occur while connecting to or talking with an RCON server.
///
/// The two client implementations map their transport-specific failures onto
/// these variants so the session layer never has to branch on protocol.
#[derive(Debug, Error)]
pub enum RconError {
    /// A connect or exec deadline elapsed before the server answered.
    ///
    /// Only `connect` surfaces this variant.  Exec deadlines degrade
    /// gracefully instead: the binary client resolves with the partial body
    /// accumulated so far, the JSON client with a placeholder string.
    #[error("timed out waiting for the RCON server")]
    Timeout,

    /// The server refused the supplied password.
    #[error("RCON authentication rejected")]
    AuthRejected,

    /// Socket-level failure: DNS, TCP connect, WebSocket handshake, write.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream connection closed while commands were still pending.
    #[error("RCON connection closed")]
    ConnectionClosed,

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The client was destroyed or never connected; the operation cannot
    /// proceed.
    #[error("not connected to an RCON server")]
    NotConnected,
}

impl From<std::io::Error> for RconError {
    fn from(err: std::io::Error) -> Self {
        RconError::Transport(err.to_string())
    }
}
