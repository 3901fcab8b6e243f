//! Inbound and outbound message shapes.

use serde::Serialize;

/// Payload that requests terminate-and-reset of the active session
/// instead of a normal submission. With no process active it degrades to
/// an empty submission.
pub const CLOSE_SENTINEL: &str = "pybridge@close";

/// Opaque caller payload. Anything that is not already a string is
/// stringified before it reaches the subprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub payload: serde_json::Value,
}

impl InboundMessage {
    pub fn new(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Normalized text form, as written to argv or stdin.
    pub fn text(&self) -> String {
        match &self.payload {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(&self.payload, serde_json::Value::String(s) if s == CLOSE_SENTINEL)
    }
}

impl From<&str> for InboundMessage {
    fn from(payload: &str) -> Self {
        Self::new(payload.to_string())
    }
}

impl From<String> for InboundMessage {
    fn from(payload: String) -> Self {
        Self::new(payload)
    }
}

impl From<serde_json::Value> for InboundMessage {
    fn from(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

/// One result: the full trimmed output of a one-shot run, or a single
/// newline-delimited chunk of a continuous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub payload: String,
}
