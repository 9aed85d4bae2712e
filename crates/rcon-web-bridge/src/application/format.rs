//! Formatter: console events → out-of-band HTML fragments.
//!
//! Every fragment carries its own splice directive – the target element id
//! and a swap mode – so the browser can place it without any further
//! coordination:
//!
//! ```html
//! <div id="console" hx-swap-oob="beforeend">
//!   <div class="console-line response">hostname: X</div>
//! </div>
//! ```
//!
//! The formatter is pure and stateless: same inputs, same fragment.  The
//! bridge treats the output as opaque; only the browser interprets it.
//! Multi-line bodies are split on `\n` with empty lines filtered, and all
//! interpolated text is HTML-escaped.

use rcon_core::MessageKind;

use crate::domain::config::{BridgeConfig, LineFormatter};

/// Renders console events as self-addressed HTML fragments.
#[derive(Clone)]
pub struct Formatter {
    target_id: String,
    swap_style: String,
    format_line: Option<LineFormatter>,
}

impl Formatter {
    pub fn new(config: &BridgeConfig, format_line: Option<LineFormatter>) -> Self {
        Self {
            target_id: config.target_id.clone(),
            swap_style: config.swap_style.clone(),
            format_line,
        }
    }

    /// Successful command output.  Echoes the command, then one line per
    /// non-empty response line.
    pub fn response(&self, body: &str, command: &str) -> String {
        let mut lines = vec![self.line(&format!("&gt; {}", escape(command)), "command")];
        lines.extend(
            body.split('\n')
                .filter(|line| !line.trim().is_empty())
                .map(|line| self.line(&escape(line), "response")),
        );
        self.fragment(&lines.concat())
    }

    /// A per-message failure (blocked command, upstream error, bad input).
    pub fn error(&self, text: &str) -> String {
        self.fragment(&self.line(&escape(text), "error"))
    }

    /// Neutral status information.
    pub fn info(&self, text: &str) -> String {
        self.fragment(&self.line(&escape(text), "info"))
    }

    /// Authentication outcome.
    pub fn auth(&self, success: bool, detail: &str) -> String {
        let (kind, prefix) = if success {
            ("auth-ok", "Connected to")
        } else {
            ("auth-failed", "Connection failed:")
        };
        self.fragment(&self.line(&format!("{} {}", prefix, escape(detail)), kind))
    }

    /// Unsolicited console output pushed by the server.
    pub fn server_message(&self, body: &str, kind: MessageKind) -> String {
        let class = format!("server-{}", kind.label());
        let lines: String = body
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.line(&escape(line), &class))
            .collect();
        self.fragment(&lines)
    }

    /// One console line.  `html` is already escaped by the caller; the
    /// `format_line` hook receives the raw text instead and owns its own
    /// escaping.
    fn line(&self, html: &str, kind: &str) -> String {
        match &self.format_line {
            Some(custom) => custom(html, kind),
            None => format!(r#"<div class="console-line {kind}">{html}</div>"#),
        }
    }

    /// Wraps rendered lines in the self-addressed container.
    fn fragment(&self, lines: &str) -> String {
        format!(
            r#"<div id="{}" hx-swap-oob="{}">{}</div>"#,
            self.target_id, self.swap_style, lines
        )
    }
}

/// Minimal HTML escaping for text interpolated into fragments.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
