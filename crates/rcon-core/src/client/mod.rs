//! RCON clients and the unified facade the bridge consumes.
//!
//! Two client implementations share one capability surface:
//!
//! - [`BinaryRconClient`] – Source-engine dialect, length-prefixed binary
//!   frames over TCP.
//! - [`JsonRconClient`] – Rust-engine dialect, JSON frames over WebSocket.
//!
//! [`RconClient`] wraps both behind tagged-variant dispatch so the session
//! layer stays protocol-agnostic; the only per-protocol difference it can
//! observe is that binary connections never yield
//! [`RconEvent::ServerMessage`].

pub mod binary;
pub mod json;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::RconError;
use crate::protocol::message::MessageKind;

pub use binary::BinaryRconClient;
pub use json::{JsonRconClient, NO_RESPONSE_PLACEHOLDER};

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Construction inputs ───────────────────────────────────────────────────────

/// Which RCON dialect to speak upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Source-engine binary RCON over TCP.
    Binary,
    /// Rust-engine JSON RCON over WebSocket.
    Json,
}

impl Protocol {
    /// The conventional RCON port for this dialect.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Binary => 27015,
            Protocol::Json => 28016,
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Protocol::Binary),
            "json" => Ok(Protocol::Json),
            other => Err(format!("unknown protocol '{other}' (expected 'binary' or 'json')")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Binary => f.write_str("binary"),
            Protocol::Json => f.write_str("json"),
        }
    }
}

/// Where to connect and how long to wait.
///
/// `timeout` bounds both the connect handshake and each individual exec.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout: Duration,
}

impl ConnectTarget {
    /// `host:port`, for logging and fragments.  Never includes the password.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Out-of-band notifications from a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconEvent {
    /// Unsolicited console output pushed by the server.  JSON dialect only.
    ServerMessage { body: String, kind: MessageKind },
    /// A recoverable protocol error (e.g. a malformed frame was dropped).
    Error(String),
    /// The connection is gone.  Terminal; the stream ends after this.
    Closed,
}

/// Stream of [`RconEvent`]s, handed out once per connection.
pub type EventReceiver = mpsc::UnboundedReceiver<RconEvent>;

// ── Unified facade ────────────────────────────────────────────────────────────

/// A connected RCON client of either dialect.
///
/// All methods dispatch to the wrapped implementation; semantics are
/// identical across dialects except where documented on the variants'
/// own types.
pub enum RconClient {
    Binary(BinaryRconClient),
    Json(JsonRconClient),
}

impl RconClient {
    /// Connects and authenticates with the selected dialect.
    ///
    /// # Errors
    ///
    /// See [`BinaryRconClient::connect`] and [`JsonRconClient::connect`].
    pub async fn connect(
        protocol: Protocol,
        target: &ConnectTarget,
    ) -> Result<(Self, EventReceiver), RconError> {
        match protocol {
            Protocol::Binary => {
                let (client, events) = BinaryRconClient::connect(target).await?;
                Ok((RconClient::Binary(client), events))
            }
            Protocol::Json => {
                let (client, events) = JsonRconClient::connect(target).await?;
                Ok((RconClient::Json(client), events))
            }
        }
    }

    /// Runs one console command; see the wrapped clients for the exact
    /// timeout semantics (both degrade gracefully, neither errors on a
    /// response deadline).
    pub async fn exec(&self, command: &str) -> Result<String, RconError> {
        match self {
            RconClient::Binary(client) => client.exec(command).await,
            RconClient::Json(client) => client.exec(command).await,
        }
    }

    /// Synchronously closes the connection and settles pending commands.
    pub fn destroy(&self) {
        match self {
            RconClient::Binary(client) => client.destroy(),
            RconClient::Json(client) => client.destroy(),
        }
    }

    /// `false` once destroyed or after the server hung up.
    pub fn is_connected(&self) -> bool {
        match self {
            RconClient::Binary(client) => client.is_connected(),
            RconClient::Json(client) => client.is_connected(),
        }
    }

    /// Number of commands currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        match self {
            RconClient::Binary(client) => client.pending_count(),
            RconClient::Json(client) => client.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parses_case_insensitively() {
        assert_eq!("binary".parse::<Protocol>().unwrap(), Protocol::Binary);
        assert_eq!("JSON".parse::<Protocol>().unwrap(), Protocol::Json);
        assert!("quake".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_default_ports() {
        assert_eq!(Protocol::Binary.default_port(), 27015);
        assert_eq!(Protocol::Json.default_port(), 28016);
    }

    #[test]
    fn test_protocol_display_roundtrips_through_fromstr() {
        for protocol in [Protocol::Binary, Protocol::Json] {
            assert_eq!(protocol.to_string().parse::<Protocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn test_endpoint_excludes_password() {
        let target = ConnectTarget {
            host: "10.0.0.5".into(),
            port: 28016,
            password: "hunter2".into(),
            timeout: Duration::from_secs(5),
        };
        let endpoint = target.endpoint();
        assert_eq!(endpoint, "10.0.0.5:28016");
        assert!(!endpoint.contains("hunter2"));
    }
}
