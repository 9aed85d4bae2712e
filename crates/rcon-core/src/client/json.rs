//! JSON Rust-RCON client.
//!
//! Rust-engine servers expose RCON as JSON over WebSocket, with the password
//! embedded in the URL path: `ws://host:port/<password>`.  Authentication is
//! implicit – a completed handshake means the password was accepted, a
//! rejected or dropped handshake means it was not.
//!
//! Unlike the binary dialect, the server pushes unsolicited console output
//! on the same socket.  Inbound frames whose `Identifier` matches a pending
//! command resolve that command; everything else (non-positive or unknown
//! identifiers) surfaces as a [`RconEvent::ServerMessage`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::HOST;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::client::{lock, ConnectTarget, EventReceiver, RconEvent};
use crate::error::RconError;
use crate::protocol::message::{CommandEnvelope, ServerMessage};
use crate::protocol::RequestIdCounter;

/// Text a timed-out exec resolves with instead of failing.
pub const NO_RESPONSE_PLACEHOLDER: &str = "(no response — timed out)";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// State shared between the client handle and its reader task.
struct Shared {
    /// In-flight commands by id.  Guarded by a std mutex; never held across
    /// an await.
    pending: std::sync::Mutex<HashMap<i32, oneshot::Sender<Result<String, RconError>>>>,
    /// Set once, on destroy or connection loss.  Terminal.
    closed: AtomicBool,
    /// Event channel to the session.  Taken (and thereby closed) by teardown.
    events: std::sync::Mutex<Option<mpsc::UnboundedSender<RconEvent>>>,
}

/// Settles every pending command and closes the event stream.  Runs its body
/// at most once.
fn teardown(shared: &Shared, error: Option<String>) {
    if shared.closed.swap(true, Ordering::SeqCst) {
        return;
    }

    let drained: Vec<_> = lock(&shared.pending).drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(RconError::ConnectionClosed));
    }

    if let Some(tx) = lock(&shared.events).take() {
        if let Some(detail) = error {
            let _ = tx.send(RconEvent::Error(detail));
        }
        let _ = tx.send(RconEvent::Closed);
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// An authenticated WebSocket connection to a Rust-engine RCON server.
pub struct JsonRconClient {
    shared: Arc<Shared>,
    /// WebSocket write half, `None` once destroyed.
    sink: tokio::sync::Mutex<Option<WsSink>>,
    ids: RequestIdCounter,
    timeout: Duration,
    reader: tokio::task::JoinHandle<()>,
}

impl JsonRconClient {
    /// Opens the WebSocket and returns the client plus its event stream.
    ///
    /// The upgrade request carries an explicit `Host: host:port` header;
    /// outbound proxies refuse the upgrade without it.
    ///
    /// # Errors
    ///
    /// - [`RconError::AuthRejected`] – the server rejected or dropped the
    ///   handshake (wrong password).
    /// - [`RconError::Timeout`] – no handshake outcome within
    ///   `target.timeout`.
    /// - [`RconError::Transport`] – DNS or socket failure.
    pub async fn connect(target: &ConnectTarget) -> Result<(Self, EventReceiver), RconError> {
        let url = format!(
            "ws://{}:{}/{}",
            target.host, target.port, target.password
        );
        let mut request = url
            .into_client_request()
            .map_err(|e| RconError::Transport(e.to_string()))?;
        let host_value = HeaderValue::from_str(&format!("{}:{}", target.host, target.port))
            .map_err(|e| RconError::Transport(e.to_string()))?;
        request.headers_mut().insert(HOST, host_value);

        let (ws_stream, _response) = match timeout(target.timeout, connect_async(request)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(classify_handshake_error(e)),
            Err(_) => return Err(RconError::Timeout),
        };

        debug!("json rcon connected to {}:{}", target.host, target.port);

        let (sink, source) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            events: std::sync::Mutex::new(Some(event_tx)),
        });

        let reader = tokio::spawn(read_loop(source, Arc::clone(&shared)));

        Ok((
            Self {
                shared,
                sink: tokio::sync::Mutex::new(Some(sink)),
                ids: RequestIdCounter::new(),
                timeout: target.timeout,
                reader,
            },
            event_rx,
        ))
    }

    /// Runs one console command and returns the server's response text.
    ///
    /// Resolves with the `Message` of the first inbound frame whose
    /// `Identifier` echoes this command's id.  If the deadline fires first,
    /// resolves with [`NO_RESPONSE_PLACEHOLDER`] – never an error.
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

        let id = self.ids.next();
        let (tx, mut rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);

        let payload = serde_json::to_string(&CommandEnvelope::new(id, command))
            .map_err(|e| RconError::Transport(e.to_string()))?;

        {
            let mut sink = self.sink.lock().await;
            let Some(ws) = sink.as_mut() else {
                lock(&self.shared.pending).remove(&id);
                return Err(RconError::NotConnected);
            };
            if let Err(e) = ws.send(WsMessage::Text(payload)).await {
                lock(&self.shared.pending).remove(&id);
                return Err(RconError::Transport(e.to_string()));
            }
        }

        match timeout(self.timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RconError::ConnectionClosed),
            Err(_) => {
                if lock(&self.shared.pending).remove(&id).is_some() {
                    Ok(NO_RESPONSE_PLACEHOLDER.to_string())
                } else {
                    // The reader settled this command as the deadline fired.
                    match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(RconError::ConnectionClosed),
                    }
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
        if let Ok(mut sink) = self.sink.try_lock() {
            *sink = None;
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

impl Drop for JsonRconClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Maps a failed WebSocket handshake onto the error taxonomy.
///
/// A server that answers the upgrade with an HTTP error, or drops the socket
/// before the upgrade completes, is rejecting the password carried in the
/// URL path.  Socket-level failures are transport errors.
fn classify_handshake_error(err: WsError) -> RconError {
    match err {
        WsError::Http(_) | WsError::Protocol(_) | WsError::ConnectionClosed | WsError::AlreadyClosed => {
            RconError::AuthRejected
        }
        WsError::Io(e) => RconError::Transport(e.to_string()),
        other => RconError::Transport(other.to_string()),
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Drains the WebSocket for the life of the connection.
async fn read_loop(mut source: WsSource, shared: Arc<Shared>) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => dispatch(&shared, &text),
            Ok(WsMessage::Close(_)) => {
                debug!("json rcon server sent close");
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
            Ok(other) => {
                debug!("ignoring non-text frame: {other:?}");
            }
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
            Err(e) => {
                warn!("json rcon read failed: {e}");
                teardown(&shared, Some(e.to_string()));
                return;
            }
        }
    }
    teardown(&shared, None);
}

/// Classifies one inbound text frame.
///
/// - `Identifier > 0` with a matching pending command → that command's
///   response.
/// - `Identifier <= 0` → unsolicited server push.
/// - A positive identifier nothing is waiting for → also treated as a push,
///   so no server output is silently lost.
/// - Undecodable JSON → dropped with an `Error` event; the connection
///   stays up.
fn dispatch(shared: &Shared, raw: &str) {
    let msg: ServerMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("dropping malformed json rcon frame: {e}");
            if let Some(tx) = lock(&shared.events).as_ref() {
                let _ = tx.send(RconEvent::Error(format!("malformed frame: {e}")));
            }
            return;
        }
    };

    if msg.identifier > 0 {
        if let Some(tx) = lock(&shared.pending).remove(&msg.identifier) {
            let _ = tx.send(Ok(msg.message));
            return;
        }
    }

    if let Some(tx) = lock(&shared.events).as_ref() {
        let _ = tx.send(RconEvent::ServerMessage {
            body: msg.message,
            kind: msg.kind,
        });
    }
}
