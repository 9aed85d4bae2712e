//! rcon-web-bridge library crate.
//!
//! Bridges browser clients to game-server RCON consoles.  Browsers cannot
//! open raw TCP sockets, and mixed-content rules forbid plaintext
//! WebSockets from a secured page, so this process terminates the browser
//! connection and speaks the native RCON dialect upstream via `rcon-core`.
//!
//! # Architecture
//!
//! ```text
//! Browser (JSON over WebSocket, or HTTP + SSE)
//!         ↕
//! [rcon-web-bridge]
//!   ├── domain/           BridgeConfig, hooks, browser message parsing
//!   ├── application/      per-session state machine, fragment formatter
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         └── http_api/   stateless POST /rcon, POST /connect, GET /stream
//!         ↕
//! rcon-core  (binary Source RCON over TCP, or JSON RCON over WebSocket)
//!         ↕
//! Game server
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `rcon-core` only.
//! - `infrastructure` owns the listeners and spawns the tasks.

pub mod application;
pub mod domain;
pub mod infrastructure;
