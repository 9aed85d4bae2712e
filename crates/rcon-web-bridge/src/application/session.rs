//! Per-session supervisor: one browser WebSocket, one upstream RCON client.
//!
//! The session is a small state machine:
//!
//! ```text
//!             auth-mode=server                  auth-mode=client
//!    ┌─────────────────────┐            ┌────────────────────────┐
//!    │ Connecting upstream │            │ Awaiting auth message  │
//!    └──────────┬──────────┘            └───────────┬────────────┘
//!               │ on success                        │ on valid credentials
//!               ▼                                   ▼
//!    ┌──────────────────────────────────────────────────────────┐
//!    │                      Authenticated                        │
//!    │  browser message  → command pipeline                      │
//!    │  upstream push    → server-message fragment               │
//!    └───────────────────────────┬──────────────────────────────┘
//!                                │ either side closes or errors
//!                                ▼
//!                            Terminated
//! ```
//!
//! All browser-visible output goes through the [`Formatter`]; the session
//! itself never builds HTML.  Per-message failures (bad input, blocked or
//! failed commands) answer with an error fragment and keep the session
//! alive; losing either socket terminates it.  Nothing here panics the
//! process: the server task logs the outcome and moves on.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use rcon_core::{ConnectTarget, EventReceiver, RconClient, RconError, RconEvent};

use crate::application::format::Formatter;
use crate::domain::config::{AuthMode, BridgeConfig, SessionHooks};
use crate::domain::messages::{parse_browser_message, AuthRequest, BrowserMessage};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type Upstream = (RconClient, EventReceiver);

/// Outcome of handling one browser message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Verdict of the pre-exec checks on a raw command string.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Empty,
    Blocked,
    Run(String),
}

/// Applies trim and the veto hook.  Pure; the I/O steps of the pipeline
/// live in [`handle_command`].
fn command_verdict(raw: &str, hooks: &SessionHooks) -> Verdict {
    let command = raw.trim();
    if command.is_empty() {
        return Verdict::Empty;
    }
    if let Some(filter) = &hooks.on_command {
        if filter(command) == Some(false) {
            return Verdict::Blocked;
        }
    }
    Verdict::Run(command.to_string())
}

/// Runs one browser session to completion.
///
/// # Errors
///
/// Returns an error only for browser-socket failures worth logging; the
/// caller logs and discards it.  Upstream failures are reported to the
/// browser as fragments and terminate the session with `Ok`.
pub async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    peer: String,
    config: Arc<BridgeConfig>,
    hooks: Arc<SessionHooks>,
) -> anyhow::Result<()> {
    let formatter = Formatter::new(&config, hooks.format_line.clone());
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut upstream: Option<Upstream> = None;

    if config.auth_mode == AuthMode::Server {
        let target = config.connect_target();
        match connect_upstream(&config, &hooks, &target).await {
            Ok(pair) => {
                send(&mut ws_tx, formatter.auth(true, &target.endpoint())).await?;
                upstream = Some(pair);
            }
            Err(e) => {
                warn!("session {peer}: upstream connect failed: {e}");
                send(&mut ws_tx, formatter.auth(false, &e.to_string())).await?;
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                return Ok(());
            }
        }
    }

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!("session {peer}: browser socket error: {e}");
                        break;
                    }
                    None => break,
                };
                match frame {
                    WsMessage::Text(text) => {
                        let flow = handle_browser_text(
                            &text,
                            &mut ws_tx,
                            &mut upstream,
                            &formatter,
                            &config,
                            &hooks,
                            &peer,
                        )
                        .await;
                        if flow == Flow::Stop {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                    other => debug!("session {peer}: ignoring non-text frame: {other:?}"),
                }
            }
            event = next_upstream_event(&mut upstream) => {
                match event {
                    Some(RconEvent::ServerMessage { body, kind }) => {
                        if !body.trim().is_empty() {
                            let _ = send(&mut ws_tx, formatter.server_message(&body, kind)).await;
                        }
                    }
                    Some(RconEvent::Error(detail)) => {
                        warn!("session {peer}: upstream error: {detail}");
                    }
                    Some(RconEvent::Closed) | None => {
                        info!("session {peer}: upstream connection closed");
                        if let Some((client, _)) = upstream.take() {
                            client.destroy();
                        }
                        let _ = send(&mut ws_tx, formatter.info("RCON connection closed")).await;
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    // Destroying the session destroys its client.
    if let Some((client, _)) = upstream.take() {
        client.destroy();
    }
    Ok(())
}

/// Yields the next upstream event, or pends forever while no upstream
/// exists (client auth mode, before credentials arrive).
async fn next_upstream_event(upstream: &mut Option<Upstream>) -> Option<RconEvent> {
    match upstream {
        Some((_, events)) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn connect_upstream(
    config: &BridgeConfig,
    hooks: &SessionHooks,
    target: &ConnectTarget,
) -> Result<Upstream, RconError> {
    let pair = RconClient::connect(config.protocol, target).await?;
    if let Some(on_connect) = &hooks.on_connect {
        on_connect(&target.endpoint());
    }
    Ok(pair)
}

/// Routes one parsed browser text frame.
async fn handle_browser_text(
    text: &str,
    ws_tx: &mut WsSink,
    upstream: &mut Option<Upstream>,
    formatter: &Formatter,
    config: &BridgeConfig,
    hooks: &SessionHooks,
    peer: &str,
) -> Flow {
    match parse_browser_message(text) {
        Err(_) => {
            let _ = send(ws_tx, formatter.error("Invalid message format")).await;
            Flow::Continue
        }
        Ok(BrowserMessage::Auth(auth)) => {
            handle_auth(auth, ws_tx, upstream, formatter, config, hooks, peer).await
        }
        Ok(BrowserMessage::Command(raw)) => {
            if upstream.is_none() && config.auth_mode == AuthMode::Client {
                let _ = send(
                    ws_tx,
                    formatter.error("Not authenticated. Send RCON credentials first."),
                )
                .await;
                return Flow::Continue;
            }
            handle_command(&raw, ws_tx, upstream, formatter, hooks, peer).await
        }
    }
}

/// Handles a browser-supplied credentials message.
///
/// Only honored before authentication under client auth mode; a failed
/// connect reports an auth-failure fragment and terminates the session.
async fn handle_auth(
    auth: AuthRequest,
    ws_tx: &mut WsSink,
    upstream: &mut Option<Upstream>,
    formatter: &Formatter,
    config: &BridgeConfig,
    hooks: &SessionHooks,
    peer: &str,
) -> Flow {
    if config.auth_mode != AuthMode::Client {
        let _ = send(ws_tx, formatter.error("Credentials are managed by the server")).await;
        return Flow::Continue;
    }
    if upstream.is_some() {
        let _ = send(ws_tx, formatter.error("Already connected to an RCON server")).await;
        return Flow::Continue;
    }

    let target = ConnectTarget {
        host: auth.host,
        port: auth.port,
        password: auth.password,
        timeout: config.timeout,
    };

    match connect_upstream(config, hooks, &target).await {
        Ok(pair) => {
            info!("session {peer}: authenticated upstream {}", target.endpoint());
            let _ = send(ws_tx, formatter.auth(true, &target.endpoint())).await;
            *upstream = Some(pair);
            Flow::Continue
        }
        Err(e) => {
            warn!("session {peer}: client-mode auth failed: {e}");
            let _ = send(ws_tx, formatter.auth(false, &e.to_string())).await;
            let _ = ws_tx.send(WsMessage::Close(None)).await;
            Flow::Stop
        }
    }
}

/// Runs the command pipeline: trim, veto, connectivity check, exec.
async fn handle_command(
    raw: &str,
    ws_tx: &mut WsSink,
    upstream: &mut Option<Upstream>,
    formatter: &Formatter,
    hooks: &SessionHooks,
    peer: &str,
) -> Flow {
    let command = match command_verdict(raw, hooks) {
        Verdict::Empty => {
            let _ = send(ws_tx, formatter.error("Empty command")).await;
            return Flow::Continue;
        }
        Verdict::Blocked => {
            debug!("session {peer}: command vetoed by filter");
            let _ = send(ws_tx, formatter.error("Command blocked")).await;
            return Flow::Continue;
        }
        Verdict::Run(command) => command,
    };

    let Some((client, events)) = upstream.as_mut() else {
        let _ = send(ws_tx, formatter.error("Not connected to an RCON server")).await;
        return Flow::Continue;
    };
    if !client.is_connected() {
        let _ = send(ws_tx, formatter.error("Not connected to an RCON server")).await;
        return Flow::Continue;
    }

    let result = exec_forwarding_pushes(client, events, ws_tx, formatter, &command).await;
    match result {
        Ok(body) => {
            let _ = send(ws_tx, formatter.response(&body, &command)).await;
        }
        Err(e) => {
            let _ = send(ws_tx, formatter.error(&format!("Command failed: {e}"))).await;
        }
    }
    Flow::Continue
}

/// Awaits an exec while still forwarding server pushes.
///
/// Without this, a push that arrives while a command is in flight would sit
/// in the event channel until the exec resolved, and the browser would see
/// the response before output the server emitted earlier.
async fn exec_forwarding_pushes(
    client: &RconClient,
    events: &mut EventReceiver,
    ws_tx: &mut WsSink,
    formatter: &Formatter,
    command: &str,
) -> Result<String, RconError> {
    let exec = client.exec(command);
    tokio::pin!(exec);

    let mut events_done = false;
    loop {
        // Biased, events first: a push the server emitted before the
        // response must reach the browser before the response fragment.
        tokio::select! {
            biased;
            event = events.recv(), if !events_done => {
                match event {
                    Some(RconEvent::ServerMessage { body, kind }) => {
                        if !body.trim().is_empty() {
                            let _ = send(ws_tx, formatter.server_message(&body, kind)).await;
                        }
                    }
                    Some(RconEvent::Error(detail)) => {
                        warn!("upstream error during exec: {detail}");
                    }
                    Some(RconEvent::Closed) | None => {
                        // The exec will now settle with ConnectionClosed;
                        // the main loop handles the terminal close.
                        events_done = true;
                    }
                }
            }
            result = &mut exec => return result,
        }
    }
}

async fn send(ws_tx: &mut WsSink, fragment: String) -> anyhow::Result<()> {
    ws_tx
        .send(WsMessage::Text(fragment))
        .await
        .map_err(|e| anyhow::anyhow!("browser send failed: {e}"))
}
