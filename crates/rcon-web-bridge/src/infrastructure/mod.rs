//! Infrastructure layer: everything that owns a socket.
//!
//! - `ws_server` – the browser-facing WebSocket accept loop.
//! - `http_api` – the stateless HTTP/SSE endpoints.
//!
//! Protocol work (codecs, clients) lives in `rcon-core`; session logic in
//! the application layer.  This layer wires them to listeners and tasks.

pub mod http_api;
pub mod ws_server;

pub use http_api::run_http_server;
pub use ws_server::{run_server, run_with_listener};
