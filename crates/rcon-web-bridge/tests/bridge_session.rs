//! End-to-end session tests: a real browser-side WebSocket client against
//! the real accept loop, with a scripted JSON RCON fixture upstream.
//!
//! Layout per test:
//!
//! ```text
//! test body (browser client)  ⇄  bridge (run_with_listener)  ⇄  fixture upstream
//! ```
//!
//! The fixtures validate the password carried in the upgrade path and then
//! play a short script; the assertions read the HTML fragments the bridge
//! sends back to the browser.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

use rcon_core::Protocol;
use rcon_web_bridge::domain::{AuthMode, BridgeConfig, SessionHooks};
use rcon_web_bridge::infrastructure::run_with_listener;

type BrowserSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type UpstreamSocket = WebSocketStream<TcpStream>;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Starts the bridge accept loop on an ephemeral port and returns the port.
async fn start_bridge(config: BridgeConfig, hooks: SessionHooks) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(run_with_listener(
        listener,
        Arc::new(config),
        Arc::new(hooks),
        running,
    ));
    port
}

/// Accepts one upstream connection, enforcing the `/password` path rule.
async fn accept_upstream(listener: &TcpListener, password: &str) -> UpstreamSocket {
    let (stream, _) = listener.accept().await.expect("upstream accept");
    let expected_path = format!("/{password}");
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut rejection = ErrorResponse::new(Some("forbidden".to_string()));
            *rejection.status_mut() = StatusCode::FORBIDDEN;
            Err(rejection)
        }
    };
    accept_hdr_async(stream, callback)
        .await
        .expect("upstream handshake")
}

async fn connect_browser(port: u16) -> BrowserSocket {
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/rcon"))
        .await
        .expect("browser connect");
    ws
}

/// Next text frame from the bridge, or `None` if it closed the socket.
async fn recv_fragment(ws: &mut BrowserSocket) -> Option<String> {
    loop {
        match ws.next().await? {
            Ok(WsMessage::Text(text)) => return Some(text),
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

async fn send_text(ws: &mut BrowserSocket, text: &str) {
    ws.send(WsMessage::Text(text.to_string()))
        .await
        .expect("browser send");
}

/// Reads command envelopes off the upstream socket, answering each with a
/// fixed response body and recording what was executed.
async fn answer_commands(mut ws: UpstreamSocket, reply: &str, log: Arc<Mutex<Vec<String>>>) {
    while let Some(Ok(frame)) = ws.next().await {
        if let WsMessage::Text(text) = frame {
            let envelope: Value = serde_json::from_str(&text).expect("fixture parse");
            log.lock()
                .unwrap()
                .push(envelope["Message"].as_str().unwrap_or_default().to_string());
            let response = json!({
                "Identifier": envelope["Identifier"],
                "Message": reply,
                "Type": "Generic",
            });
            if ws.send(WsMessage::Text(response.to_string())).await.is_err() {
                break;
            }
        }
    }
}

fn server_mode_config(upstream_port: u16, password: &str) -> BridgeConfig {
    BridgeConfig {
        protocol: Protocol::Json,
        host: "127.0.0.1".to_string(),
        port: upstream_port,
        password: password.to_string(),
        auth_mode: AuthMode::Server,
        timeout: Duration::from_millis(2000),
        ..BridgeConfig::default()
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn server_mode_connects_and_runs_commands() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executed_in_fixture = Arc::clone(&executed);
    tokio::spawn(async move {
        let ws = accept_upstream(&upstream, "secret").await;
        answer_commands(ws, "hostname: rusty", executed_in_fixture).await;
    });

    let bridge_port = start_bridge(
        server_mode_config(upstream_port, "secret"),
        SessionHooks::default(),
    )
    .await;
    let mut browser = connect_browser(bridge_port).await;

    let auth = recv_fragment(&mut browser).await.expect("auth fragment");
    assert!(auth.contains("auth-ok"));
    assert!(auth.contains(&format!("127.0.0.1:{upstream_port}")));

    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let response = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(response.contains("&gt; status"));
    assert!(response.contains("hostname: rusty"));

    assert_eq!(*executed.lock().unwrap(), vec!["status".to_string()]);
}

#[tokio::test]
async fn server_mode_auth_failure_closes_browser_socket() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    tokio::spawn(async move {
        // Fixture only accepts "/right"; the bridge offers "/wrong".
        let _ = accept_upstream(&upstream, "right").await;
    });

    let bridge_port = start_bridge(
        server_mode_config(upstream_port, "wrong"),
        SessionHooks::default(),
    )
    .await;
    let mut browser = connect_browser(bridge_port).await;

    let fragment = recv_fragment(&mut browser).await.expect("auth-failure fragment");
    assert!(fragment.contains("auth-failed"));
    assert!(
        recv_fragment(&mut browser).await.is_none(),
        "the bridge must close the browser socket after a failed auth"
    );
}

#[tokio::test]
async fn client_mode_requires_auth_before_commands() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executed_in_fixture = Arc::clone(&executed);
    tokio::spawn(async move {
        let ws = accept_upstream(&upstream, "secret").await;
        answer_commands(ws, "ok", executed_in_fixture).await;
    });

    let config = BridgeConfig {
        auth_mode: AuthMode::Client,
        timeout: Duration::from_millis(2000),
        ..BridgeConfig::default()
    };
    let bridge_port = start_bridge(config, SessionHooks::default()).await;
    let mut browser = connect_browser(bridge_port).await;

    // Command before auth: instructional error, session stays open.
    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let fragment = recv_fragment(&mut browser).await.expect("error fragment");
    assert!(fragment.contains("Not authenticated"));

    // Now authenticate with the fixture's credentials.
    let auth_msg = json!({
        "auth": { "host": "127.0.0.1", "port": upstream_port, "password": "secret" }
    });
    send_text(&mut browser, &auth_msg.to_string()).await;
    let auth = recv_fragment(&mut browser).await.expect("auth fragment");
    assert!(auth.contains("auth-ok"));

    // The same command now goes through.
    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let response = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(response.contains("&gt; status"));
    assert!(response.contains("ok"));
    assert_eq!(*executed.lock().unwrap(), vec!["status".to_string()]);
}

#[tokio::test]
async fn vetoed_command_never_reaches_upstream() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executed_in_fixture = Arc::clone(&executed);
    tokio::spawn(async move {
        let ws = accept_upstream(&upstream, "secret").await;
        answer_commands(ws, "ok", executed_in_fixture).await;
    });

    let hooks = SessionHooks {
        on_command: Some(Arc::new(|cmd| Some(!cmd.starts_with("quit")))),
        ..SessionHooks::default()
    };
    let bridge_port = start_bridge(server_mode_config(upstream_port, "secret"), hooks).await;
    let mut browser = connect_browser(bridge_port).await;
    let _auth = recv_fragment(&mut browser).await.expect("auth fragment");

    send_text(&mut browser, r#"{"command":"quit now"}"#).await;
    let blocked = recv_fragment(&mut browser).await.expect("blocked fragment");
    assert!(blocked.contains("Command blocked"));

    // A permitted command afterwards proves the session survived the veto,
    // and its arrival upstream proves the vetoed one was never sent.
    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let response = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(response.contains("&gt; status"));
    assert_eq!(*executed.lock().unwrap(), vec!["status".to_string()]);
}

#[tokio::test]
async fn push_interleaved_with_response_reaches_browser_first() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut ws = accept_upstream(&upstream, "secret").await;
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let envelope: Value = serde_json::from_str(&text).unwrap();
            // Unsolicited push first, then the command's response.
            let push = json!({"Identifier": -1, "Message": "player joined", "Type": "Generic"});
            ws.send(WsMessage::Text(push.to_string())).await.unwrap();
            let response = json!({"Identifier": envelope["Identifier"], "Message": "ok"});
            ws.send(WsMessage::Text(response.to_string())).await.unwrap();
        }
    });

    let bridge_port = start_bridge(
        server_mode_config(upstream_port, "secret"),
        SessionHooks::default(),
    )
    .await;
    let mut browser = connect_browser(bridge_port).await;
    let _auth = recv_fragment(&mut browser).await.expect("auth fragment");

    send_text(&mut browser, r#"{"command":"say hi"}"#).await;

    let first = recv_fragment(&mut browser).await.expect("push fragment");
    assert!(first.contains("server-generic"));
    assert!(first.contains("player joined"));

    let second = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(second.contains("&gt; say hi"));
    assert!(second.contains("ok"));
}

#[tokio::test]
async fn invalid_and_empty_messages_answer_with_error_fragments() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    tokio::spawn(async move {
        let ws = accept_upstream(&upstream, "secret").await;
        answer_commands(ws, "ok", Arc::new(Mutex::new(Vec::new()))).await;
    });

    let bridge_port = start_bridge(
        server_mode_config(upstream_port, "secret"),
        SessionHooks::default(),
    )
    .await;
    let mut browser = connect_browser(bridge_port).await;
    let _auth = recv_fragment(&mut browser).await.expect("auth fragment");

    send_text(&mut browser, "not even json").await;
    let invalid = recv_fragment(&mut browser).await.expect("invalid fragment");
    assert!(invalid.contains("Invalid message format"));

    send_text(&mut browser, r#"{"command":"   "}"#).await;
    let empty = recv_fragment(&mut browser).await.expect("empty fragment");
    assert!(empty.contains("Empty command"));

    // The session survived both bad messages.
    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let response = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(response.contains("&gt; status"));
}

#[tokio::test]
async fn upstream_close_notifies_browser_and_ends_session() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut ws = accept_upstream(&upstream, "secret").await;
        ws.close(None).await.expect("fixture close");
    });

    let bridge_port = start_bridge(
        server_mode_config(upstream_port, "secret"),
        SessionHooks::default(),
    )
    .await;
    let mut browser = connect_browser(bridge_port).await;
    let _auth = recv_fragment(&mut browser).await.expect("auth fragment");

    let notice = recv_fragment(&mut browser).await.expect("close fragment");
    assert!(notice.contains("RCON connection closed"));
    assert!(
        recv_fragment(&mut browser).await.is_none(),
        "the bridge must close the browser socket after the upstream is gone"
    );
}

#[tokio::test]
async fn server_mode_bridges_binary_dialect() {
    use rcon_core::protocol::packet::{self, kind, SENTINEL_ID};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = upstream.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = upstream.accept().await.unwrap();
        let mut buf: Vec<u8> = Vec::new();
        let mut tmp = [0u8; 1024];

        loop {
            // Drain one complete frame, reading more bytes as needed.
            let frame = loop {
                if let Some((frame, consumed)) = packet::decode(&buf).unwrap() {
                    buf.drain(..consumed);
                    break frame;
                }
                let n = stream.read(&mut tmp).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&tmp[..n]);
            };

            match (frame.kind, frame.id) {
                (kind::AUTH, _) => {
                    assert_eq!(frame.body, "secret");
                    let reply = packet::encode(frame.id, kind::AUTH_RESPONSE, "");
                    stream.write_all(&reply).await.unwrap();
                }
                (kind::RESPONSE_VALUE, SENTINEL_ID) => {
                    // Sentinel echo comes after the response chunks.
                    let echo = packet::encode(SENTINEL_ID, kind::RESPONSE_VALUE, "");
                    stream.write_all(&echo).await.unwrap();
                }
                (kind::EXEC_COMMAND, id) => {
                    let body = format!("echo: {}\n", frame.body);
                    let reply = packet::encode(id, kind::RESPONSE_VALUE, &body);
                    stream.write_all(&reply).await.unwrap();
                }
                other => panic!("fixture got unexpected frame {other:?}"),
            }
        }
    });

    let config = BridgeConfig {
        protocol: Protocol::Binary,
        ..server_mode_config(upstream_port, "secret")
    };
    let bridge_port = start_bridge(config, SessionHooks::default()).await;
    let mut browser = connect_browser(bridge_port).await;

    let auth = recv_fragment(&mut browser).await.expect("auth fragment");
    assert!(auth.contains("auth-ok"));

    send_text(&mut browser, r#"{"command":"status"}"#).await;
    let response = recv_fragment(&mut browser).await.expect("response fragment");
    assert!(response.contains("&gt; status"));
    assert!(response.contains("echo: status"));
}

#[tokio::test]
async fn wrong_ws_path_is_rejected_during_handshake() {
    let bridge_port = start_bridge(BridgeConfig::default(), SessionHooks::default()).await;

    let result = connect_async(format!("ws://127.0.0.1:{bridge_port}/other/path")).await;
    assert!(result.is_err(), "non-configured paths must not upgrade");
}
