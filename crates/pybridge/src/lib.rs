//! pybridge: bridge to external interpreter scripts.
//!
//! Spawns one interpreter subprocess per unit of work (or a single
//! persistent one fed over stdin), multiplexes its stdout/stderr into
//! discrete output events, and pushes status transitions to a
//! caller-registered sink.

mod bridge;
mod config;
mod error;
mod message;
mod session;
mod status;

pub use bridge::{ProcessBridge, Submission, SubmissionEvent, SubmitOutcome};
pub use config::{BridgeConfig, ExecMode};
pub use error::{ConfigError, RunError};
pub use message::{CLOSE_SENTINEL, InboundMessage, OutboundMessage};
pub use status::{Severity, StatusEvent};
