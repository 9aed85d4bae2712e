//! Bridge configuration and session hooks.
//!
//! [`BridgeConfig`] is the single source of truth for runtime settings.  It
//! is built once at startup (from CLI arguments in production, from
//! [`BridgeConfig::default`] plus field tweaks in tests) and then shared
//! across session tasks behind an `Arc`.  The domain layer never reads the
//! environment itself; `main.rs` owns that mapping.
//!
//! [`SessionHooks`] carries the host application's capability injections:
//! a connect notification, a command veto filter, and a line-format
//! override.  They are plain function values, not trait objects with state,
//! and must not retain references that outlive a session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rcon_core::{ConnectTarget, Protocol};

/// Who supplies the upstream credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// The bridge connects with the host/port/password from its own config
    /// as soon as the browser session opens.
    Server,
    /// The browser must send an auth message with credentials before any
    /// command is accepted.
    Client,
}

impl std::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(AuthMode::Server),
            "client" => Ok(AuthMode::Client),
            other => Err(format!("unknown auth mode '{other}' (expected 'server' or 'client')")),
        }
    }
}

/// All runtime configuration for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Which RCON dialect to speak upstream.
    pub protocol: Protocol,

    /// Upstream game server host.  Used in `server` auth mode; in `client`
    /// mode the browser supplies its own target.
    pub host: String,

    /// Upstream RCON port.  Defaults to the dialect's conventional port
    /// (binary 27015, json 28016).
    pub port: u16,

    /// Upstream RCON password.  Used in `server` auth mode only.
    pub password: String,

    /// Address the browser-facing WebSocket listener binds to.
    pub ws_bind_addr: SocketAddr,

    /// Request path browsers must use for the WebSocket upgrade.
    pub ws_path: String,

    /// Address the stateless HTTP/SSE listener binds to.
    pub http_bind_addr: SocketAddr,

    /// Who supplies the upstream credentials.
    pub auth_mode: AuthMode,

    /// Connect and per-command deadline.
    pub timeout: Duration,

    /// DOM element id the formatter's fragments target.
    pub target_id: String,

    /// Splice mode the formatter's fragments request (e.g. `beforeend`).
    pub swap_style: String,
}

impl BridgeConfig {
    /// The upstream target described by this config.
    ///
    /// Only meaningful under [`AuthMode::Server`]; client-mode sessions
    /// build their target from the browser's auth message instead.
    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }
}

impl Default for BridgeConfig {
    /// Defaults suitable for local development against a Rust server on the
    /// same machine.
    fn default() -> Self {
        Self {
            protocol: Protocol::Json,
            host: "127.0.0.1".to_string(),
            port: Protocol::Json.default_port(),
            password: String::new(),
            // Compile-time-known literals; parse cannot fail.
            ws_bind_addr: "0.0.0.0:8765".parse().unwrap(),
            ws_path: "/ws/rcon".to_string(),
            http_bind_addr: "0.0.0.0:8766".parse().unwrap(),
            auth_mode: AuthMode::Server,
            timeout: Duration::from_millis(5000),
            target_id: "console".to_string(),
            swap_style: "beforeend".to_string(),
        }
    }
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

/// Veto filter: return `Some(false)` to block a command, `Some(true)` or
/// `None` to let it through.  Receives the trimmed command text.
pub type CommandFilter = Arc<dyn Fn(&str) -> Option<bool> + Send + Sync>;

/// Notified once per successful upstream authentication with the endpoint
/// (`host:port`) the session connected to.
pub type ConnectNotifier = Arc<dyn Fn(&str) + Send + Sync>;

/// Replaces the formatter's default per-line rendering.  Receives the line
/// text and the line's kind label (`response`, `error`, `info`, ...), and
/// returns the HTML for that line.
pub type LineFormatter = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Capability injections supplied by the hosting application.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub on_connect: Option<ConnectNotifier>,
    pub on_command: Option<CommandFilter>,
    pub format_line: Option<LineFormatter>,
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_command", &self.on_command.is_some())
            .field("format_line", &self.format_line.is_some())
            .finish()
    }
}
