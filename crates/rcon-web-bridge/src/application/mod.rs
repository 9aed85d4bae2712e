//! Application layer: the session state machine and the formatter.
//!
//! Depends on the domain layer and `rcon-core` only; the sockets that feed
//! it live in the infrastructure layer.

pub mod format;
pub mod session;

pub use format::Formatter;
pub use session::run_session;
