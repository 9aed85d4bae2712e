//! rcon-web-bridge – entry point.
//!
//! Runs two listeners side by side:
//!
//! - a WebSocket endpoint (`--ws-bind`, path `--ws-path`) that gives each
//!   browser a persistent session bridged to one upstream RCON client, and
//! - a stateless HTTP endpoint (`--http-bind`) with `POST /rcon`,
//!   `POST /connect`, and an SSE `GET /stream`.
//!
//! # Usage
//!
//! ```text
//! rcon-web-bridge [OPTIONS]
//!
//! Options:
//!   --protocol  <binary|json>   Upstream RCON dialect [default: json]
//!   --host      <HOST>          Upstream game server [default: 127.0.0.1]
//!   --port      <PORT>          Upstream RCON port [default: 27015 binary / 28016 json]
//!   --password  <PASSWORD>      Upstream RCON password
//!   --ws-bind   <ADDR>          WebSocket listener [default: 0.0.0.0:8765]
//!   --ws-path   <PATH>          WebSocket upgrade path [default: /ws/rcon]
//!   --http-bind <ADDR>          HTTP/SSE listener [default: 0.0.0.0:8766]
//!   --auth-mode <server|client> Who supplies credentials [default: server]
//!   --timeout-ms <MS>           Connect/exec deadline [default: 5000]
//! ```
//!
//! Every flag can also come from an environment variable (`RCON_PROTOCOL`,
//! `RCON_HOST`, `RCON_PORT`, `RCON_PASSWORD`, `RCON_WS_BIND`,
//! `RCON_WS_PATH`, `RCON_HTTP_BIND`, `RCON_AUTH_MODE`, `RCON_TIMEOUT_MS`,
//! `RCON_TARGET_ID`, `RCON_SWAP_STYLE`); flags win when both are present.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rcon_core::Protocol;
use rcon_web_bridge::domain::{AuthMode, BridgeConfig, SessionHooks};
use rcon_web_bridge::infrastructure::{run_http_server, run_server};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket and HTTP/SSE bridge between browsers and game-server RCON
/// consoles.
#[derive(Debug, Parser)]
#[command(
    name = "rcon-web-bridge",
    about = "Bridge browser clients to game-server RCON consoles",
    version
)]
struct Cli {
    /// Upstream RCON dialect.
    #[arg(long, default_value = "json", env = "RCON_PROTOCOL")]
    protocol: Protocol,

    /// Upstream game server host.
    #[arg(long, default_value = "127.0.0.1", env = "RCON_HOST")]
    host: String,

    /// Upstream RCON port.  Defaults to the dialect's conventional port:
    /// 27015 for binary, 28016 for json.
    #[arg(long, env = "RCON_PORT")]
    port: Option<u16>,

    /// Upstream RCON password (server auth mode).
    #[arg(long, default_value = "", env = "RCON_PASSWORD")]
    password: String,

    /// Address for the browser-facing WebSocket listener.
    #[arg(long, default_value = "0.0.0.0:8765", env = "RCON_WS_BIND")]
    ws_bind: SocketAddr,

    /// Request path for the WebSocket upgrade.
    #[arg(long, default_value = "/ws/rcon", env = "RCON_WS_PATH")]
    ws_path: String,

    /// Address for the stateless HTTP/SSE listener.
    #[arg(long, default_value = "0.0.0.0:8766", env = "RCON_HTTP_BIND")]
    http_bind: SocketAddr,

    /// Who supplies the upstream credentials: `server` connects with this
    /// process's config, `client` waits for the browser to send them.
    #[arg(long, default_value = "server", env = "RCON_AUTH_MODE")]
    auth_mode: AuthMode,

    /// Connect and per-command deadline in milliseconds.
    #[arg(long, default_value_t = 5000, env = "RCON_TIMEOUT_MS")]
    timeout_ms: u64,

    /// DOM element id that output fragments target.
    #[arg(long, default_value = "console", env = "RCON_TARGET_ID")]
    target_id: String,

    /// Splice mode that output fragments request.
    #[arg(long, default_value = "beforeend", env = "RCON_SWAP_STYLE")]
    swap_style: String,
}

impl Cli {
    fn into_bridge_config(self) -> BridgeConfig {
        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        BridgeConfig {
            protocol: self.protocol,
            host: self.host,
            port,
            password: self.password,
            ws_bind_addr: self.ws_bind,
            ws_path: self.ws_path,
            http_bind_addr: self.http_bind,
            auth_mode: self.auth_mode,
            timeout: Duration::from_millis(self.timeout_ms),
            target_id: self.target_id,
            swap_style: self.swap_style,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(cli.into_bridge_config());
    let hooks = Arc::new(SessionHooks::default());

    info!(
        "rcon-web-bridge starting – protocol={}, upstream={}:{}, ws={}{}, http={}",
        config.protocol, config.host, config.port, config.ws_bind_addr, config.ws_path,
        config.http_bind_addr
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C: {e}");
            }
        }
    });

    tokio::try_join!(
        run_server(Arc::clone(&config), Arc::clone(&hooks), Arc::clone(&running)),
        run_http_server(config, hooks, running),
    )?;

    info!("rcon-web-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rcon-web-bridge"]);
        assert_eq!(cli.protocol, Protocol::Json);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, None);
        assert_eq!(cli.ws_path, "/ws/rcon");
        assert_eq!(cli.auth_mode, AuthMode::Server);
        assert_eq!(cli.timeout_ms, 5000);
    }

    #[test]
    fn test_default_port_follows_protocol() {
        let json = Cli::parse_from(["rcon-web-bridge"]).into_bridge_config();
        assert_eq!(json.port, 28016);

        let binary = Cli::parse_from(["rcon-web-bridge", "--protocol", "binary"])
            .into_bridge_config();
        assert_eq!(binary.port, 27015);
    }

    #[test]
    fn test_explicit_port_wins_over_protocol_default() {
        let config = Cli::parse_from(["rcon-web-bridge", "--protocol", "binary", "--port", "9999"])
            .into_bridge_config();
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn test_auth_mode_override() {
        let cli = Cli::parse_from(["rcon-web-bridge", "--auth-mode", "client"]);
        assert_eq!(cli.auth_mode, AuthMode::Client);
    }

    #[test]
    fn test_timeout_flows_into_config() {
        let config =
            Cli::parse_from(["rcon-web-bridge", "--timeout-ms", "1500"]).into_bridge_config();
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_bind_addresses_parse() {
        let cli = Cli::parse_from([
            "rcon-web-bridge",
            "--ws-bind",
            "127.0.0.1:9000",
            "--http-bind",
            "127.0.0.1:9001",
        ]);
        assert_eq!(cli.ws_bind.port(), 9000);
        assert_eq!(cli.http_bind.port(), 9001);
    }

    #[test]
    fn test_formatter_settings_flow_into_config() {
        let config = Cli::parse_from([
            "rcon-web-bridge",
            "--target-id",
            "output",
            "--swap-style",
            "afterbegin",
        ])
        .into_bridge_config();
        assert_eq!(config.target_id, "output");
        assert_eq!(config.swap_style, "afterbegin");
    }

    #[test]
    fn test_invalid_protocol_is_rejected() {
        assert!(Cli::try_parse_from(["rcon-web-bridge", "--protocol", "quake"]).is_err());
    }
}
