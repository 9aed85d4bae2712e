//! Inbound browser message parsing.
//!
//! Browsers send small JSON objects over the session WebSocket:
//!
//! ```json
//! { "auth": { "host": "10.0.0.9", "port": 28016, "password": "secret" } }
//! { "command": "status" }
//! ```
//!
//! Older UI builds send the auth fields as flat dotted keys (`"auth.host"`,
//! `"auth.port"`, `"auth.password"`); those are normalized into the nested
//! form before typed parsing.  `port` is accepted as either a JSON number
//! or a numeric string, since HTML form values arrive as strings.
//!
//! Anything that is not valid JSON or does not match one of the two shapes
//! is an [`InvalidMessage`], answered with an error fragment; one bad
//! message never closes the session.

use serde_json::Value;

/// Credentials supplied by the browser in client auth mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub host: String,
    pub port: u16,
    pub password: String,
}

/// One parsed browser message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMessage {
    Auth(AuthRequest),
    Command(String),
}

/// The browser sent something the bridge cannot interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMessage;

/// Parses one raw WebSocket text frame from the browser.
///
/// # Errors
///
/// Returns [`InvalidMessage`] for non-JSON input, non-object JSON, unknown
/// shapes, and auth objects with missing or malformed fields.
pub fn parse_browser_message(raw: &str) -> Result<BrowserMessage, InvalidMessage> {
    let value: Value = serde_json::from_str(raw).map_err(|_| InvalidMessage)?;
    let Value::Object(map) = value else {
        return Err(InvalidMessage);
    };

    if let Some(auth) = normalized_auth(&map) {
        return parse_auth(&auth).map(BrowserMessage::Auth);
    }

    if let Some(command) = map.get("command") {
        let Value::String(text) = command else {
            return Err(InvalidMessage);
        };
        return Ok(BrowserMessage::Command(text.clone()));
    }

    Err(InvalidMessage)
}

/// Extracts the auth object, folding the flat-key aliases into nested form.
///
/// Nested `"auth"` wins when both spellings are present.
fn normalized_auth(map: &serde_json::Map<String, Value>) -> Option<serde_json::Map<String, Value>> {
    if let Some(Value::Object(nested)) = map.get("auth") {
        return Some(nested.clone());
    }

    let mut flat = serde_json::Map::new();
    for (alias, field) in [
        ("auth.host", "host"),
        ("auth.port", "port"),
        ("auth.password", "password"),
    ] {
        if let Some(value) = map.get(alias) {
            flat.insert(field.to_string(), value.clone());
        }
    }
    if flat.is_empty() {
        None
    } else {
        Some(flat)
    }
}

fn parse_auth(auth: &serde_json::Map<String, Value>) -> Result<AuthRequest, InvalidMessage> {
    let host = match auth.get("host") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(InvalidMessage),
    };

    let port = match auth.get("port") {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or(InvalidMessage)?,
        Some(Value::String(s)) => s.trim().parse::<u16>().map_err(|_| InvalidMessage)?,
        _ => return Err(InvalidMessage),
    };

    let password = match auth.get("password") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(InvalidMessage),
    };

    Ok(AuthRequest { host, port, password })
}
