//! Binary codec for Source-engine RCON frames.
//!
//! Wire format (all integers little-endian):
//! ```text
//! [size:i32][id:i32][kind:i32][body: UTF-8 bytes][0x00][0x00]
//! ```
//! `size` counts everything after itself, so `size = 4 + 4 + body.len() + 2`.
//! The smallest legal frame is a body-less one with `size == 10`.
//!
//! The codec is pure: no sockets, no async, no shared state.  The clients
//! feed it a growing receive buffer and drain complete frames in order.

use crate::error::RconError;

/// Packet kind codes as they appear on the wire.
///
/// Kind `2` is overloaded by the protocol: a client-to-server packet with
/// kind 2 is an `EXEC_COMMAND`, a server-to-client packet with kind 2 is an
/// `AUTH_RESPONSE`.  Direction disambiguates.
pub mod kind {
    /// Client → server: password handshake.
    pub const AUTH: i32 = 3;
    /// Server → client: handshake outcome (id `-1` means rejected).
    pub const AUTH_RESPONSE: i32 = 2;
    /// Client → server: run a console command.
    pub const EXEC_COMMAND: i32 = 2;
    /// Server → client: command output chunk.  Also sent client → server as
    /// the end-of-response sentinel (see [`SENTINEL_ID`]).
    pub const RESPONSE_VALUE: i32 = 0;
}

/// Request id reserved for the end-of-response sentinel.
///
/// After sending an `EXEC_COMMAND`, the client immediately sends an empty
/// `RESPONSE_VALUE` with this id.  The server processes packets strictly in
/// order and mirrors the sentinel back after all real response chunks, which
/// is how the client detects that a multi-packet response is complete.
pub const SENTINEL_ID: i32 = 9999;

/// Byte count of the `id` + `kind` fields plus the two NUL terminators.
/// `size` can never be smaller than this.
const MIN_FRAME_SIZE: usize = 10;

/// Upper bound on a single frame's declared `size`.
///
/// A server that declares a larger frame is treated as malformed rather than
/// allowed to grow the receive buffer without bound.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One decoded Source-RCON frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Request identifier.  `-1` on an `AUTH_RESPONSE` signals a rejected
    /// password; [`SENTINEL_ID`] marks the end-of-response echo.
    pub id: i32,
    /// One of the [`kind`] constants.
    pub kind: i32,
    /// Frame body.  Decoded as lossy UTF-8; servers occasionally emit
    /// non-UTF-8 bytes in console output.
    pub body: String,
}

/// Encodes one frame.
///
/// Encoding is total: any `id`, `kind`, and body string produce a valid
/// frame.
///
/// # Examples
///
/// ```rust
/// use rcon_core::protocol::packet::{decode, encode, kind};
///
/// let bytes = encode(7, kind::EXEC_COMMAND, "status");
/// let (packet, consumed) = decode(&bytes).unwrap().unwrap();
/// assert_eq!(packet.id, 7);
/// assert_eq!(packet.body, "status");
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode(id: i32, kind: i32, body: &str) -> Vec<u8> {
    let size = (MIN_FRAME_SIZE + body.len()) as i32;

    let mut buf = Vec::with_capacity(4 + size as usize);
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf.push(0x00); // body terminator
    buf.push(0x00); // packet terminator
    buf
}

/// Decodes one frame from the beginning of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame
/// (fewer than 4 bytes, or fewer than `4 + size` bytes) – the caller keeps
/// the bytes and retries after the next read.  Returns the decoded packet
/// and the total bytes consumed (`4 + size`) otherwise.
///
/// # Errors
///
/// Returns [`RconError::MalformedFrame`] when the declared `size` is below
/// the body-less minimum or above [`MAX_FRAME_SIZE`].
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, RconError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let size = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if size < MIN_FRAME_SIZE as i32 {
        return Err(RconError::MalformedFrame(format!(
            "declared size {size} is below the {MIN_FRAME_SIZE}-byte minimum"
        )));
    }
    let size = size as usize;
    if size > MAX_FRAME_SIZE {
        return Err(RconError::MalformedFrame(format!(
            "declared size {size} exceeds the {MAX_FRAME_SIZE}-byte frame cap"
        )));
    }

    let total = 4 + size;
    if buf.len() < total {
        return Ok(None);
    }

    let id = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let kind = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);

    // Body sits between the kind field and the two trailing NULs.
    let body_bytes = &buf[12..total - 2];
    let body = String::from_utf8_lossy(body_bytes).into_owned();

    Ok(Some((Packet { id, kind, body }, total)))
}
