//! Binary Source-RCON client.
//!
//! Owns one TCP connection to a Source-engine game server.  The connection
//! goes through a password handshake at connect time, after which commands
//! are multiplexed over the stream and matched to responses by request id.
//!
//! # Multi-packet responses and the sentinel
//!
//! The protocol gives no length or "last packet" marker for a command's
//! response, and large responses arrive as several `RESPONSE_VALUE` frames.
//! The client therefore follows every `EXEC_COMMAND` with an empty
//! `RESPONSE_VALUE` frame carrying the reserved id
//! [`SENTINEL_ID`](crate::protocol::packet::SENTINEL_ID).  The server
//! processes packets strictly in order and mirrors the sentinel back after
//! the real response frames, so the sentinel echo marks end-of-response.
//!
//! The sentinel echo completes the *oldest* pending command, which is only
//! correct while at most one command is outstanding.  [`exec`] holds an
//! internal gate for its whole duration to enforce that serialization.
//!
//! [`exec`]: BinaryRconClient::exec

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::{lock, ConnectTarget, EventReceiver, RconEvent};
use crate::error::RconError;
use crate::protocol::packet::{self, kind, SENTINEL_ID};
use crate::protocol::RequestIdCounter;

// ── Pending-command table ─────────────────────────────────────────────────────

/// One in-flight command: its id, the response body accumulated so far, and
/// the channel that resolves the caller's `exec`.
struct PendingCommand {
    id: i32,
    body: String,
    tx: oneshot::Sender<Result<String, RconError>>,
}

/// State shared between the client handle and its reader task.
struct Shared {
    /// In-flight commands in issuance order.  The sentinel echo completes
    /// the front entry.  Guarded by a std mutex; never held across an await.
    pending: std::sync::Mutex<VecDeque<PendingCommand>>,
    /// Set once, on destroy or connection loss.  Terminal.
    closed: AtomicBool,
    /// Event channel to the session.  Taken (and thereby closed) by teardown.
    events: std::sync::Mutex<Option<mpsc::UnboundedSender<RconEvent>>>,
}

/// Settles every pending command and closes the event stream.  Runs its body
/// at most once; later callers see `closed` already set and return.
fn teardown(shared: &Shared, error: Option<String>) {
    if shared.closed.swap(true, Ordering::SeqCst) {
        return;
    }

    let drained: Vec<PendingCommand> = lock(&shared.pending).drain(..).collect();
    for entry in drained {
        let _ = entry.tx.send(Err(RconError::ConnectionClosed));
    }

    if let Some(tx) = lock(&shared.events).take() {
        if let Some(detail) = error {
            let _ = tx.send(RconEvent::Error(detail));
        }
        let _ = tx.send(RconEvent::Closed);
    }
}

/// Removes the pending entry for `id`, if it is still in the table.
fn remove_pending(shared: &Shared, id: i32) -> Option<PendingCommand> {
    let mut pending = lock(&shared.pending);
    let index = pending.iter().position(|entry| entry.id == id)?;
    pending.remove(index)
}

// ── Client ────────────────────────────────────────────────────────────────────

/// An authenticated connection to a Source-engine RCON server.
pub struct BinaryRconClient {
    shared: Arc<Shared>,
    /// Write half, `None` once destroyed.  A tokio mutex because writes
    /// await mid-hold.
    write: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    ids: RequestIdCounter,
    timeout: Duration,
    /// Serializes `exec` calls; see the module docs on sentinel resolution.
    exec_gate: tokio::sync::Mutex<()>,
    reader: tokio::task::JoinHandle<()>,
}

impl BinaryRconClient {
    /// Opens a TCP connection and performs the password handshake.
    ///
    /// Also returns the client's event stream.  Binary servers have no
    /// unsolicited push, so the stream only ever yields `Error` and
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// - [`RconError::Timeout`] – no authentication outcome within
    ///   `target.timeout`.
    /// - [`RconError::AuthRejected`] – the server answered the handshake
    ///   with an `AUTH_RESPONSE` carrying id `-1`.
    /// - [`RconError::Transport`] – TCP connect or write failure.
    /// - [`RconError::ConnectionClosed`] – the server hung up mid-handshake.
    pub async fn connect(target: &ConnectTarget) -> Result<(Self, EventReceiver), RconError> {
        let addr = format!("{}:{}", target.host, target.port);
        let stream = match timeout(target.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RconError::Transport(e.to_string())),
            Err(_) => return Err(RconError::Timeout),
        };
        let _ = stream.set_nodelay(true);

        let (mut read_half, mut write_half) = stream.into_split();

        let ids = RequestIdCounter::new();
        let auth_id = ids.next();
        let auth_frame = packet::encode(auth_id, kind::AUTH, &target.password);
        match timeout(target.timeout, write_half.write_all(&auth_frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RconError::Transport(e.to_string())),
            Err(_) => return Err(RconError::Timeout),
        }

        // Read until the server settles the handshake.  Any bytes past the
        // auth exchange stay in `buf` and are handed to the reader task.
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        match timeout(
            target.timeout,
            await_auth_outcome(&mut read_half, &mut buf, auth_id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(RconError::Timeout),
        }

        debug!("binary rcon authenticated with {addr}");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: std::sync::Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            events: std::sync::Mutex::new(Some(event_tx)),
        });

        let reader = tokio::spawn(read_loop(read_half, buf, Arc::clone(&shared)));

        Ok((
            Self {
                shared,
                write: tokio::sync::Mutex::new(Some(write_half)),
                ids,
                timeout: target.timeout,
                exec_gate: tokio::sync::Mutex::new(()),
                reader,
            },
            event_rx,
        ))
    }

    /// Runs one console command and returns the full response text.
    ///
    /// A response spread over several frames is concatenated in arrival
    /// order.  If the per-command deadline fires before the sentinel echo,
    /// the command resolves with whatever has accumulated so far – a stalled
    /// server degrades output, it does not produce an error.
    ///
    /// # Errors
    ///
    /// - [`RconError::NotConnected`] – the client was destroyed.
    /// - [`RconError::ConnectionClosed`] – the server hung up while the
    ///   command was pending.
    /// - [`RconError::Transport`] – the command could not be written.
    pub async fn exec(&self, command: &str) -> Result<String, RconError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RconError::NotConnected);
        }

        // One command at a time on this connection; see the module docs.
        let _gate = self.exec_gate.lock().await;

        let id = self.ids.next();
        let (tx, mut rx) = oneshot::channel();
        lock(&self.shared.pending).push_back(PendingCommand {
            id,
            body: String::new(),
            tx,
        });

        // The command frame and the sentinel frame go out back to back; the
        // server answers them in the same order.
        let mut frames = packet::encode(id, kind::EXEC_COMMAND, command);
        frames.extend_from_slice(&packet::encode(SENTINEL_ID, kind::RESPONSE_VALUE, ""));

        {
            let mut write = self.write.lock().await;
            let Some(stream) = write.as_mut() else {
                remove_pending(&self.shared, id);
                return Err(RconError::NotConnected);
            };
            if let Err(e) = stream.write_all(&frames).await {
                remove_pending(&self.shared, id);
                return Err(RconError::Transport(e.to_string()));
            }
        }

        match timeout(self.timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RconError::ConnectionClosed),
            Err(_) => {
                // Deadline hit.  If the entry is still in the table, pull it
                // out and resolve with the partial body.  If it is gone, the
                // reader settled it concurrently; collect that outcome.
                match remove_pending(&self.shared, id) {
                    Some(entry) => Ok(entry.body),
                    None => match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(RconError::ConnectionClosed),
                    },
                }
            }
        }
    }

    /// Closes the connection and settles every pending command.
    ///
    /// Subsequent `exec` calls fail with [`RconError::NotConnected`].
    pub fn destroy(&self) {
        teardown(&self.shared, None);
        self.reader.abort();
        if let Ok(mut write) = self.write.try_lock() {
            *write = None;
        }
    }

    /// `false` once the client was destroyed or the server hung up.
    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of commands currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.shared.pending).len()
    }
}

impl Drop for BinaryRconClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Reads frames until the server accepts or rejects the password.
///
/// Servers emit an empty `RESPONSE_VALUE` with id `-1` or `0` ahead of the
/// real `AUTH_RESPONSE`; those are protocol noise and skipped.  Bytes read
/// past the auth exchange remain in `buf`.
async fn await_auth_outcome(
    read_half: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    auth_id: i32,
) -> Result<(), RconError> {
    let mut tmp = vec![0u8; 4096];
    loop {
        while let Some((frame, consumed)) = packet::decode(buf)? {
            buf.drain(..consumed);
            match (frame.kind, frame.id) {
                (kind::AUTH_RESPONSE, -1) => return Err(RconError::AuthRejected),
                (kind::AUTH_RESPONSE, id) if id == auth_id => return Ok(()),
                (kind::RESPONSE_VALUE, -1 | 0) => {
                    debug!("ignoring pre-auth response frame (id {})", frame.id);
                }
                (other_kind, other_id) => {
                    debug!("ignoring pre-auth frame kind {other_kind} id {other_id}");
                }
            }
        }

        let n = read_half.read(&mut tmp).await?;
        if n == 0 {
            return Err(RconError::ConnectionClosed);
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Drains the TCP stream for the life of the connection.
///
/// Every wake-up dispatches as many complete frames as the buffer holds;
/// partial frames stay buffered until more bytes arrive.  A decode error or
/// EOF tears the connection down, which settles all pending commands.
async fn read_loop(mut read_half: OwnedReadHalf, mut buf: Vec<u8>, shared: Arc<Shared>) {
    let mut tmp = vec![0u8; 4096];
    loop {
        loop {
            match packet::decode(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    dispatch(&shared, frame);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("binary rcon stream unrecoverable: {e}");
                    teardown(&shared, Some(e.to_string()));
                    return;
                }
            }
        }

        match read_half.read(&mut tmp).await {
            Ok(0) => {
                debug!("binary rcon server closed the connection");
                teardown(&shared, None);
                return;
            }
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(e) => {
                warn!("binary rcon read failed: {e}");
                teardown(&shared, Some(e.to_string()));
                return;
            }
        }
    }
}

/// Routes one inbound frame into the pending table.
fn dispatch(shared: &Shared, frame: packet::Packet) {
    if frame.kind != kind::RESPONSE_VALUE && frame.kind != kind::AUTH_RESPONSE {
        debug!("ignoring frame with unexpected kind {}", frame.kind);
        return;
    }

    if frame.id == SENTINEL_ID {
        // End-of-response echo: the oldest pending command is complete.
        let entry = lock(&shared.pending).pop_front();
        if let Some(entry) = entry {
            let _ = entry.tx.send(Ok(entry.body));
        }
        return;
    }

    let mut pending = lock(&shared.pending);
    if let Some(entry) = pending.iter_mut().find(|entry| entry.id == frame.id) {
        entry.body.push_str(&frame.body);
    } else {
        // Late frame for a command that already timed out; drop it.
        debug!("dropping response frame for unknown id {}", frame.id);
    }
}
