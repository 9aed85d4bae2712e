//! Stateless HTTP/SSE variant of the bridge.
//!
//! Unlike the WebSocket sessions, these endpoints hold no per-browser
//! state: every request opens its own short-lived JSON RCON client against
//! the configured upstream and closes it when done.
//!
//! - `POST /rcon` – run one command, return the formatted fragment.
//! - `POST /connect` – probe the upstream, return an auth fragment.
//! - `GET /stream` – hold a client open and relay every server push as an
//!   SSE `console` event; comment heartbeats keep idle connections warm.
//!
//! Only the JSON dialect is served here: the binary dialect has no
//! unsolicited push, so a stateless stream over it would never emit.

use std::convert::Infallible;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Form, Router};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use rcon_core::{EventReceiver, JsonRconClient, RconEvent};

use crate::application::format::Formatter;
use crate::domain::config::{BridgeConfig, SessionHooks};

/// Response deadline for the one-shot command endpoint.
const STATELESS_EXEC_DEADLINE: Duration = Duration::from_secs(8);

/// Interval between SSE comment heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct HttpApiState {
    config: Arc<BridgeConfig>,
    formatter: Arc<Formatter>,
}

/// Builds the stateless endpoint router.
pub fn router(config: Arc<BridgeConfig>, hooks: &SessionHooks) -> Router {
    let formatter = Arc::new(Formatter::new(&config, hooks.format_line.clone()));
    Router::new()
        .route("/rcon", post(exec_command))
        .route("/connect", post(test_connection))
        .route("/stream", get(console_stream))
        .with_state(HttpApiState { config, formatter })
}

/// Binds the HTTP listener and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_http_server(
    config: Arc<BridgeConfig>,
    hooks: Arc<SessionHooks>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.http_bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.http_bind_addr))?;

    info!("HTTP/SSE endpoints listening on {}", config.http_bind_addr);

    let app = router(Arc::clone(&config), &hooks);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while running.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            info!("shutdown flag set; stopping HTTP server");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CommandForm {
    command: String,
}

/// `POST /rcon` – one command over a fresh upstream client.
async fn exec_command(
    State(state): State<HttpApiState>,
    Form(form): Form<CommandForm>,
) -> Html<String> {
    let command = form.command.trim().to_string();
    if command.is_empty() {
        return Html(state.formatter.error("Empty command"));
    }

    let mut target = state.config.connect_target();
    target.timeout = STATELESS_EXEC_DEADLINE;

    match JsonRconClient::connect(&target).await {
        Ok((client, _events)) => {
            let result = client.exec(&command).await;
            client.destroy();
            match result {
                Ok(body) => Html(state.formatter.response(&body, &command)),
                Err(e) => Html(state.formatter.error(&format!("Command failed: {e}"))),
            }
        }
        Err(e) => {
            warn!("stateless command connect failed: {e}");
            Html(state.formatter.error(&format!("Command failed: {e}")))
        }
    }
}

/// `POST /connect` – probe the upstream and report the outcome.
async fn test_connection(State(state): State<HttpApiState>) -> Html<String> {
    let target = state.config.connect_target();
    match JsonRconClient::connect(&target).await {
        Ok((client, _events)) => {
            client.destroy();
            Html(state.formatter.auth(true, &target.endpoint()))
        }
        Err(e) => Html(state.formatter.auth(false, &e.to_string())),
    }
}

/// State threaded through the `GET /stream` unfold.
enum StreamState {
    /// Connect failed; one error event remains to be emitted.
    Failed(String),
    /// Live upstream; pushes become events until it closes.
    Live(JsonRconClient, EventReceiver),
    /// Terminal.
    Done,
}

/// `GET /stream` – long-lived push relay as Server-Sent Events.
///
/// The upstream client lives inside the stream state, so a browser
/// disconnect drops the stream and with it the client, closing the
/// upstream socket.
async fn console_stream(
    State(state): State<HttpApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let target = state.config.connect_target();
    let formatter = Arc::clone(&state.formatter);

    let initial = match JsonRconClient::connect(&target).await {
        Ok((client, events)) => {
            info!("stream session opened against {}", target.endpoint());
            StreamState::Live(client, events)
        }
        Err(e) => {
            warn!("stream connect failed: {e}");
            StreamState::Failed(e.to_string())
        }
    };

    let stream = stream::unfold((initial, formatter), |(stream_state, formatter)| async move {
        match stream_state {
            StreamState::Failed(detail) => {
                let event = Event::default()
                    .event("console")
                    .data(formatter.error(&format!("Console stream unavailable: {detail}")));
                Some((
                    Ok::<_, Infallible>(event),
                    (StreamState::Done, formatter),
                ))
            }
            StreamState::Done => None,
            StreamState::Live(client, mut events) => loop {
                match events.recv().await {
                    Some(RconEvent::ServerMessage { body, kind }) => {
                        if body.trim().is_empty() {
                            continue;
                        }
                        let event = Event::default()
                            .event("console")
                            .data(formatter.server_message(&body, kind));
                        return Some((Ok(event), (StreamState::Live(client, events), formatter)));
                    }
                    Some(RconEvent::Error(detail)) => {
                        debug!("stream upstream error: {detail}");
                        continue;
                    }
                    Some(RconEvent::Closed) | None => {
                        debug!("stream upstream closed; ending SSE stream");
                        return None;
                    }
                }
            },
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
