//! Status events pushed to the caller's sink.
//!
//! Every observable state change is a named variant; severity and label
//! are derived from the variant rather than stored, so invalid
//! severity/label pairs cannot be constructed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warn,
    Error,
}

/// Snapshot of one bridge state change. Ephemeral: forwarded to the
/// registered sink and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Process spawned, or quiet after a burst of output.
    Standby,
    /// Output arriving.
    Processing,
    /// Stderr observed; carries the accumulated error text.
    Error(String),
    /// Nonzero exit.
    Exited(i32),
    /// One-shot session finished cleanly.
    Done,
    /// Continuous session finished cleanly.
    ScriptClosed,
    /// Overlapping submission dropped.
    NotAcceptingInput,
    /// Neutral state, some time after exit.
    Cleared,
}

impl StatusEvent {
    /// `None` for the neutral [`StatusEvent::Cleared`] state.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::Standby | Self::Processing | Self::Done => Some(Severity::Ok),
            Self::ScriptClosed | Self::NotAcceptingInput => Some(Severity::Warn),
            Self::Error(_) | Self::Exited(_) => Some(Severity::Error),
            Self::Cleared => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Standby => "Standby".to_string(),
            Self::Processing => "Processing data".to_string(),
            Self::Error(text) => format!("Error: {text}"),
            Self::Exited(code) => format!("Exited: {code}"),
            Self::Done => "Done".to_string(),
            Self::ScriptClosed => "Script Closed".to_string(),
            Self::NotAcceptingInput => "Not accepting input".to_string(),
            Self::Cleared => String::new(),
        }
    }

    /// `{severity, label}` shape for sinks that forward status as JSON.
    /// The neutral state renders as the empty object.
    pub fn to_payload(&self) -> serde_json::Value {
        match self.severity() {
            Some(severity) => serde_json::json!({
                "severity": severity,
                "label": self.label(),
            }),
            None => serde_json::json!({}),
        }
    }
}
