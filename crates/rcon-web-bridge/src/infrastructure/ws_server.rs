//! WebSocket server: accept loop and per-session task management.
//!
//! Binds a TCP listener on the configured address, upgrades incoming
//! connections whose request path matches `ws_path`, and spawns one session
//! task per browser.  A slow or broken session never blocks the accept
//! loop, and a session error never takes the process down – the task logs
//! the outcome and dies alone.
//!
//! Shutdown is cooperative: the accept loop re-checks a shared flag between
//! short `accept` timeouts, so a cleared flag stops the bridge within a few
//! hundred milliseconds.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::application::session::run_session;
use crate::domain::config::{BridgeConfig, SessionHooks};

/// Binds the configured address and runs the accept loop until `running`
/// is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// privileges).
pub async fn run_server(
    config: Arc<BridgeConfig>,
    hooks: Arc<SessionHooks>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;

    info!(
        "WebSocket bridge listening on {} (path {})",
        config.ws_bind_addr, config.ws_path
    );

    run_with_listener(listener, config, hooks, running).await
}

/// Accept loop over an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind an ephemeral port and
/// learn it before the loop starts.
pub async fn run_with_listener(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    hooks: Arc<SessionHooks>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded accept so the loop can re-check the shutdown flag even
        // when no browsers are connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new browser connection from {peer_addr}");
                let config = Arc::clone(&config);
                let hooks = Arc::clone(&hooks);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, config, hooks).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept failure (e.g. fd exhaustion); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection within the window; loop back to the flag check.
            }
        }
    }

    Ok(())
}

/// Upgrades one TCP connection and runs its session to completion.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
    hooks: Arc<SessionHooks>,
) {
    let expected_path = config.ws_path.clone();
    let path_check = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws_stream = match accept_hdr_async(stream, path_check).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("session {peer_addr}: WebSocket handshake failed: {e}");
            return;
        }
    };

    info!("session {peer_addr}: established");
    match run_session(ws_stream, peer_addr.to_string(), config, hooks).await {
        Ok(()) => info!("session {peer_addr}: closed"),
        Err(e) => warn!("session {peer_addr}: closed with error: {e:#}"),
    }
}
