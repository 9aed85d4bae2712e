//! JSON wire messages for the Rust-engine RCON dialect.
//!
//! Rust-engine servers speak JSON over WebSocket.  The client sends a
//! [`CommandEnvelope`] and the server answers with [`ServerMessage`] frames.
//! Frames whose `Identifier` is non-positive are unsolicited console pushes
//! rather than command responses.
//!
//! Field names are capitalised on the wire (`Identifier`, `Message`, ...);
//! serde renames keep the Rust side idiomatic.

use serde::{Deserialize, Serialize};

/// The `Name` value this client stamps on every outbound command.
pub const CLIENT_NAME: &str = "rcon-bridge";

/// Severity tag carried by server messages.
///
/// Servers emit tags beyond the documented three; anything unrecognised
/// deserializes as `Generic` so a new server build cannot break the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Warning,
    Error,
    #[serde(other)]
    Generic,
}

impl MessageKind {
    /// Lowercase label used by the formatter for CSS class names.
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Generic => "generic",
            MessageKind::Warning => "warning",
            MessageKind::Error => "error",
        }
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Generic
    }
}

/// One inbound frame from a Rust-engine RCON server.
///
/// `Identifier > 0` echoes the id of a command this client sent;
/// `Identifier <= 0` marks an unsolicited server push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "Identifier")]
    pub identifier: i32,

    #[serde(rename = "Message", default)]
    pub message: String,

    #[serde(rename = "Type", default)]
    pub kind: MessageKind,

    #[serde(rename = "Name", default)]
    pub name: String,
}

/// One outbound command frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(rename = "Identifier")]
    pub identifier: i32,

    #[serde(rename = "Message")]
    pub message: String,

    #[serde(rename = "Name")]
    pub name: String,
}

impl CommandEnvelope {
    /// Builds the envelope for one console command.
    pub fn new(identifier: i32, command: &str) -> Self {
        Self {
            identifier,
            message: command.to_string(),
            name: CLIENT_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_envelope_serializes_with_wire_field_names() {
        let envelope = CommandEnvelope::new(7, "status");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""Identifier":7"#));
        assert!(json.contains(r#""Message":"status""#));
        assert!(json.contains(r#""Name":"rcon-bridge""#));
    }

    #[test]
    fn test_server_message_deserializes_from_wire_form() {
        let json = r#"{"Identifier":7,"Message":"ok","Type":"Generic","Name":"server"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.identifier, 7);
        assert_eq!(msg.message, "ok");
        assert_eq!(msg.kind, MessageKind::Generic);
        assert_eq!(msg.name, "server");
    }

    #[test]
    fn test_server_push_with_negative_identifier() {
        let json = r#"{"Identifier":-1,"Message":"player joined","Type":"Generic"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.identifier, -1);
        assert_eq!(msg.name, "", "missing Name defaults to empty");
    }

    #[test]
    fn test_warning_and_error_kinds_deserialize() {
        let warn: ServerMessage =
            serde_json::from_str(r#"{"Identifier":0,"Message":"w","Type":"Warning"}"#).unwrap();
        let err: ServerMessage =
            serde_json::from_str(r#"{"Identifier":0,"Message":"e","Type":"Error"}"#).unwrap();
        assert_eq!(warn.kind, MessageKind::Warning);
        assert_eq!(err.kind, MessageKind::Error);
    }

    #[test]
    fn test_unknown_kind_falls_back_to_generic() {
        let json = r#"{"Identifier":-1,"Message":"hi","Type":"Chat"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Generic);
    }

    #[test]
    fn test_missing_type_defaults_to_generic() {
        let json = r#"{"Identifier":3,"Message":"done"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Generic);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(MessageKind::Generic.label(), "generic");
        assert_eq!(MessageKind::Warning.label(), "warning");
        assert_eq!(MessageKind::Error.label(), "error");
    }
}
