//! Per-subprocess session state machine.
//!
//! Pure and synchronous: the stream pump in `bridge` feeds it spawn, data,
//! idle, close, and exit events; it answers with status events and
//! completed messages. Mode handling and buffering live here so the pump
//! stays a plain I/O loop.

use std::fmt;

use crate::config::ExecMode;
use crate::error::RunError;
use crate::message::OutboundMessage;
use crate::status::StatusEvent;

/// Unique identifier for one spawned subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Submission accepted, process not yet confirmed running.
    Spawning,
    /// Process live, streams being pumped.
    Streaming,
    /// Termination requested, waiting for the process to go down.
    AwaitingExit,
    /// Process gone, session over.
    Idle,
}

/// What a process exit produced: the status to report, and the result to
/// put on the submission channel (absent for clean continuous exits).
pub(crate) struct ExitOutcome {
    pub status: StatusEvent,
    pub result: Option<Result<OutboundMessage, RunError>>,
}

pub(crate) struct Session {
    mode: ExecMode,
    phase: Phase,
    stdout: String,
    stderr: String,
}

impl Session {
    pub fn new(mode: ExecMode) -> Self {
        Self {
            mode,
            phase: Phase::Spawning,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn on_spawned(&mut self) -> StatusEvent {
        self.phase = Phase::Streaming;
        StatusEvent::Standby
    }

    pub fn on_spawn_failed(&mut self, error: &std::io::Error) -> StatusEvent {
        self.phase = Phase::Idle;
        StatusEvent::Error(error.to_string())
    }

    /// Accumulate a stdout chunk. In continuous modes, a buffer that has
    /// become newline-terminated is emitted whole and reset — several
    /// writes that arrive before the terminating newline go out as one
    /// message, in production order.
    pub fn on_stdout(&mut self, chunk: &str) -> (StatusEvent, Option<OutboundMessage>) {
        self.stdout.push_str(chunk);

        let message = if self.mode.is_continuous() && self.stdout.ends_with('\n') {
            let payload = strip_line_ending(&self.stdout).to_string();
            self.stdout.clear();
            Some(OutboundMessage { payload })
        } else {
            None
        };

        (StatusEvent::Processing, message)
    }

    pub fn on_stderr(&mut self, chunk: &str) -> StatusEvent {
        self.stderr.push_str(chunk);
        StatusEvent::Error(self.stderr.clone())
    }

    /// Quiet-window expiry. Meaningful only while streaming.
    pub fn on_idle(&mut self) -> Option<StatusEvent> {
        (self.phase == Phase::Streaming).then_some(StatusEvent::Standby)
    }

    pub fn on_close_requested(&mut self) {
        if self.phase == Phase::Streaming {
            self.phase = Phase::AwaitingExit;
        }
    }

    /// `code` is `None` when the process was signal-terminated, which is
    /// treated as a clean exit: the close path kills the child, and a
    /// one-shot session killed mid-run still reports its partial output.
    pub fn on_exit(&mut self, code: Option<i32>) -> ExitOutcome {
        self.phase = Phase::Idle;

        match code {
            Some(code) if code != 0 => ExitOutcome {
                status: StatusEvent::Exited(code),
                result: Some(Err(RunError::Exit {
                    code,
                    stderr: std::mem::take(&mut self.stderr),
                })),
            },
            _ if !self.mode.is_continuous() => ExitOutcome {
                status: StatusEvent::Done,
                result: Some(Ok(OutboundMessage {
                    payload: self.stdout.trim().to_string(),
                })),
            },
            _ => ExitOutcome {
                status: StatusEvent::ScriptClosed,
                result: None,
            },
        }
    }
}

fn strip_line_ending(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_moves_to_streaming_with_standby() {
        let mut session = Session::new(ExecMode::OneShot);
        assert_eq!(session.phase(), Phase::Spawning);
        assert_eq!(session.on_spawned(), StatusEvent::Standby);
        assert_eq!(session.phase(), Phase::Streaming);
    }

    #[test]
    fn one_shot_buffers_until_exit() {
        let mut session = Session::new(ExecMode::OneShot);
        session.on_spawned();

        let (status, message) = session.on_stdout("hi\n");
        assert_eq!(status, StatusEvent::Processing);
        assert!(message.is_none());

        let outcome = session.on_exit(Some(0));
        assert_eq!(outcome.status, StatusEvent::Done);
        let result = outcome.result.unwrap().unwrap();
        assert_eq!(result.payload, "hi");
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn continuous_emits_chunk_once_buffer_is_newline_terminated() {
        let mut session = Session::new(ExecMode::Continuous);
        session.on_spawned();

        let (_, message) = session.on_stdout("a");
        assert!(message.is_none());

        let (_, message) = session.on_stdout("b\n");
        assert_eq!(message.unwrap().payload, "ab");

        // buffer was reset
        let (_, message) = session.on_stdout("next\n");
        assert_eq!(message.unwrap().payload, "next");
    }

    #[test]
    fn chunk_that_gathered_interior_newlines_goes_out_whole() {
        let mut session = Session::new(ExecMode::Continuous);
        session.on_spawned();

        let (_, message) = session.on_stdout("a\nb");
        assert!(message.is_none());
        let (_, message) = session.on_stdout("c\n");
        assert_eq!(message.unwrap().payload, "a\nbc");
    }

    #[test]
    fn stderr_accumulates_into_the_error_label() {
        let mut session = Session::new(ExecMode::OneShot);
        session.on_spawned();

        assert_eq!(
            session.on_stderr("bo"),
            StatusEvent::Error("bo".to_string())
        );
        assert_eq!(
            session.on_stderr("om"),
            StatusEvent::Error("boom".to_string())
        );
    }

    #[test]
    fn nonzero_exit_reports_code_and_accumulated_stderr() {
        let mut session = Session::new(ExecMode::Continuous);
        session.on_spawned();
        session.on_stderr("boom");

        let outcome = session.on_exit(Some(3));
        assert_eq!(outcome.status, StatusEvent::Exited(3));
        match outcome.result {
            Some(Err(RunError::Exit { code, stderr })) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[test]
    fn clean_continuous_exit_produces_no_result() {
        let mut session = Session::new(ExecMode::Continuous);
        session.on_spawned();

        let outcome = session.on_exit(Some(0));
        assert_eq!(outcome.status, StatusEvent::ScriptClosed);
        assert!(outcome.result.is_none());
    }

    #[test]
    fn signal_termination_counts_as_clean() {
        let mut session = Session::new(ExecMode::OneShot);
        session.on_spawned();
        session.on_stdout("partial");
        session.on_close_requested();
        assert_eq!(session.phase(), Phase::AwaitingExit);

        let outcome = session.on_exit(None);
        assert_eq!(outcome.status, StatusEvent::Done);
        assert_eq!(outcome.result.unwrap().unwrap().payload, "partial");
    }

    #[test]
    fn idle_only_fires_while_streaming() {
        let mut session = Session::new(ExecMode::Continuous);
        assert!(session.on_idle().is_none());

        session.on_spawned();
        assert_eq!(session.on_idle(), Some(StatusEvent::Standby));

        session.on_close_requested();
        assert!(session.on_idle().is_none());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
