//! Domain layer: pure types with no I/O.
//!
//! - Configuration and the session hook signatures.
//! - The browser-facing message shapes and their parser.
//!
//! Nothing here touches `tokio`, sockets, or the environment, which keeps
//! these types trivially testable and reusable from the stateless HTTP
//! endpoints as well as the WebSocket sessions.

pub mod config;
pub mod messages;

pub use config::{AuthMode, BridgeConfig, SessionHooks};
pub use messages::{parse_browser_message, AuthRequest, BrowserMessage};
