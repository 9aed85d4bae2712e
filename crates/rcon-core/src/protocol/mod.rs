//! Wire-format layer: frame codecs and request-id allocation.
//!
//! The two RCON dialects share nothing on the wire:
//!
//! - **`packet`** – the binary Source-engine framing (length-prefixed
//!   little-endian packets over TCP).
//! - **`message`** – the Rust-engine JSON frames carried over WebSocket.
//! - **`request_id`** – the id counter both clients draw from so responses
//!   can be matched to in-flight commands.
//!
//! Everything in this module is pure; the clients in [`crate::client`] own
//! the sockets.

pub mod message;
pub mod packet;
pub mod request_id;

pub use message::{CommandEnvelope, MessageKind, ServerMessage};
pub use packet::{Packet, SENTINEL_ID};
pub use request_id::RequestIdCounter;
