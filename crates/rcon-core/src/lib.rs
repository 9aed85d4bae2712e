//! # rcon-core
//!
//! Client library for the two RCON dialects spoken by game servers:
//!
//! - **Binary Source RCON** – length-prefixed little-endian frames over TCP
//!   with a password handshake, multi-packet responses, and an
//!   end-of-response sentinel.
//! - **Rust-engine JSON RCON** – JSON frames over WebSocket with the
//!   password in the URL path and unsolicited console pushes interleaved
//!   with responses.
//!
//! The crate splits into two layers:
//!
//! - **`protocol`** – pure wire-format code: the binary packet codec, the
//!   JSON message types, and the request-id counter.  No sockets.
//! - **`client`** – the async clients that own a connection each, plus the
//!   [`RconClient`] facade that lets callers stay dialect-agnostic.
//!
//! Consumers that bridge browsers to these servers live in the
//! `rcon-web-bridge` crate; this crate knows nothing about browsers, HTML,
//! or HTTP.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{
    BinaryRconClient, ConnectTarget, EventReceiver, JsonRconClient, Protocol, RconClient,
    RconEvent, NO_RESPONSE_PLACEHOLDER,
};
pub use error::RconError;
pub use protocol::{MessageKind, Packet, ServerMessage, SENTINEL_ID};
