//! ProcessBridge - spawns interpreter subprocesses and pumps their streams.
//!
//! Flow:
//! 1. `submit` either spawns a fresh process (one-shot, continuous) or
//!    writes to the live process's stdin (persistent-stdin)
//! 2. A pump task per subprocess reads stdout/stderr, feeds the session
//!    state machine, and forwards results to the submission channel
//! 3. Status events go to the registered sink in state-change order
//! 4. `close` kills the active process and resets the session slot

use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeConfig, ExecMode};
use crate::error::{ConfigError, RunError};
use crate::message::{InboundMessage, OutboundMessage};
use crate::session::{Session, SessionId};
use crate::status::StatusEvent;

/// One result event on a submission channel.
pub type SubmissionEvent = Result<OutboundMessage, RunError>;

/// Receiving side of a submission's result channel: a single event in
/// one-shot mode, a stream of chunk events in continuous modes.
#[derive(Debug)]
pub struct Submission {
    events: mpsc::UnboundedReceiver<SubmissionEvent>,
}

impl Submission {
    fn new(events: mpsc::UnboundedReceiver<SubmissionEvent>) -> Self {
        Self { events }
    }

    /// Next output chunk or error; `None` once the session is over.
    pub async fn next_event(&mut self) -> Option<SubmissionEvent> {
        self.events.recv().await
    }

    /// First (and in one-shot mode, only) event of the submission.
    pub async fn wait(mut self) -> SubmissionEvent {
        self.events.recv().await.unwrap_or(Err(RunError::Interrupted))
    }
}

/// How a submission was dispatched.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// A fresh subprocess was spawned; results arrive on the submission.
    Started(Submission),
    /// A persistent-stdin session is live; the payload was written to its
    /// stdin. Output keeps flowing on the first submission's channel.
    Forwarded,
    /// Dropped: a non-persistent continuous session is still running.
    /// Only the status sink observes this ("Not accepting input").
    Rejected,
    /// The payload was the close sentinel and the active process was
    /// killed and the session reset.
    Terminated,
}

impl SubmitOutcome {
    pub fn into_submission(self) -> Option<Submission> {
        match self {
            Self::Started(submission) => Some(submission),
            _ => None,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    /// Live stdin handle, persistent-stdin mode only.
    stdin: Option<ChildStdin>,
    shutdown: CancellationToken,
}

struct Shared {
    /// Most recent status sink; a new subscription replaces the old one.
    status: StdMutex<Option<mpsc::UnboundedSender<StatusEvent>>>,
    /// The tracked live subprocess, if any. Mutated by `submit`, `close`,
    /// and the pump's exit path; never by caller code.
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl Shared {
    fn emit(&self, event: StatusEvent) {
        let guard = match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sink) = guard.as_ref() {
            let _ = sink.send(event);
        }
    }
}

/// Bridge to one external interpreter script.
///
/// Owns at most one tracked live subprocess. Construction validates the
/// configured paths and never spawns anything.
pub struct ProcessBridge {
    config: BridgeConfig,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ProcessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProcessBridge {
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                status: StdMutex::new(None),
                active: tokio::sync::Mutex::new(None),
            }),
        })
    }

    /// Register a status sink. The bridge keeps only the most recent
    /// subscription; an earlier receiver sees its channel close.
    pub fn subscribe_status(&self) -> mpsc::UnboundedReceiver<StatusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = match self.shared.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(tx);
        rx
    }

    /// Dispatch one inbound message according to the configured mode.
    ///
    /// Never returns an error: spawn and exit failures arrive on the
    /// submission channel, overlap rejections only on the status sink.
    pub async fn submit(&self, message: impl Into<InboundMessage>) -> SubmitOutcome {
        let message = message.into();
        let mut payload = message.text();

        let mut active = self.shared.active.lock().await;

        if message.is_close() {
            if active.is_some() {
                terminate_active(&mut active);
                return SubmitOutcome::Terminated;
            }
            // nothing to close: degrade to an empty submission
            payload.clear();
        }

        match self.config.mode() {
            ExecMode::Continuous if active.is_some() => {
                tracing::debug!("submission dropped: continuous session still running");
                self.shared.emit(StatusEvent::NotAcceptingInput);
                SubmitOutcome::Rejected
            }
            ExecMode::PersistentStdin if active.is_some() => {
                self.shared.emit(StatusEvent::Standby);
                if let Some(session) = active.as_mut()
                    && let Some(stdin) = session.stdin.as_mut()
                    && let Err(error) = stdin.write_all(format!("{payload}\n").as_bytes()).await
                {
                    tracing::warn!(%error, "stdin write to interpreter failed");
                }
                SubmitOutcome::Forwarded
            }
            _ => self.start_session(&mut active, &payload).await,
        }
    }

    /// Kill the active subprocess, if any, and clear the session slot.
    /// Idempotent. Callers must invoke this from their teardown hook or a
    /// persistent interpreter outlives the bridge.
    pub async fn close(&self) {
        let mut active = self.shared.active.lock().await;
        terminate_active(&mut active);
    }

    async fn start_session(
        &self,
        slot: &mut Option<ActiveSession>,
        payload: &str,
    ) -> SubmitOutcome {
        let persistent = self.config.mode().keeps_process();
        let mut session = Session::new(self.config.mode());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let submission = Submission::new(events_rx);

        let mut command = Command::new(self.config.interpreter_path());
        command.arg("-u").arg(self.config.script_name());
        if !persistent {
            // payload rides argv, present even when empty
            command.arg(payload);
        }
        command
            .current_dir(self.config.script_dir())
            .stdin(if persistent {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(
                    %error,
                    script = %self.config.script().display(),
                    "failed to spawn interpreter"
                );
                self.shared.emit(session.on_spawn_failed(&error));
                let _ = events_tx.send(Err(RunError::Spawn(error)));
                return SubmitOutcome::Started(submission);
            }
        };

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let error = std::io::Error::other("stdout/stderr not captured");
                self.shared.emit(session.on_spawn_failed(&error));
                let _ = events_tx.send(Err(RunError::Spawn(error)));
                return SubmitOutcome::Started(submission);
            }
        };

        let id = SessionId::new();
        tracing::info!(session = %id, mode = ?self.config.mode(), "interpreter spawned");
        self.shared.emit(session.on_spawned());

        let mut stdin = child.stdin.take();
        if persistent
            && let Some(handle) = stdin.as_mut()
            && let Err(error) = handle.write_all(format!("{payload}\n").as_bytes()).await
        {
            tracing::warn!(%error, "stdin write to interpreter failed");
        }

        let shutdown = CancellationToken::new();
        *slot = Some(ActiveSession {
            id,
            stdin: if persistent { stdin } else { None },
            shutdown: shutdown.clone(),
        });

        tokio::spawn(
            SessionPump {
                shared: Arc::clone(&self.shared),
                id,
                session,
                child,
                stdout,
                stderr,
                events: events_tx,
                shutdown,
                idle_window: self.config.idle_window(),
                clear_delay: self.config.clear_delay(),
            }
            .run(),
        );

        SubmitOutcome::Started(submission)
    }
}

fn terminate_active(slot: &mut Option<ActiveSession>) {
    if let Some(session) = slot.take() {
        tracing::info!(session = %session.id, "terminating interpreter session");
        session.shutdown.cancel();
    }
}

/// Send SIGTERM, matching what the original environment's `kill()` did;
/// hard-kill only as a fallback.
#[cfg(unix)]
fn terminate_child(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return; // already reaped
    };
    if let Err(error) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::warn!(%error, "SIGTERM failed, falling back to kill");
        if let Err(error) = child.start_kill() {
            tracing::warn!(%error, "kill failed");
        }
    }
}

#[cfg(not(unix))]
fn terminate_child(child: &mut Child) {
    if let Err(error) = child.start_kill() {
        tracing::warn!(%error, "kill failed");
    }
}

/// Event loop for one subprocess: drains stdout/stderr to EOF, watches
/// for exit and teardown, and keeps the idle-status timer.
struct SessionPump {
    shared: Arc<Shared>,
    id: SessionId,
    session: Session,
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    events: mpsc::UnboundedSender<SubmissionEvent>,
    shutdown: CancellationToken,
    idle_window: Duration,
    clear_delay: Duration,
}

impl SessionPump {
    async fn run(self) {
        let SessionPump {
            shared,
            id,
            mut session,
            mut child,
            mut stdout,
            mut stderr,
            events,
            shutdown,
            idle_window,
            clear_delay,
        } = self;

        let mut out_buf = vec![0u8; 4096];
        let mut err_buf = vec![0u8; 4096];
        let mut stdout_open = true;
        let mut stderr_open = true;
        // Some(code) once the child is reaped; inner None = signal-terminated
        let mut exit_code: Option<Option<i32>> = None;
        let mut closing = false;

        let idle = tokio::time::sleep(idle_window);
        tokio::pin!(idle);
        let mut idle_armed = false;

        // Streams are drained to EOF before the exit result is delivered,
        // so chunks always reach the caller in production order.
        while exit_code.is_none() || stdout_open || stderr_open {
            tokio::select! {
                biased;

                read = stdout.read(&mut out_buf), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&out_buf[..n]);
                        let (status, message) = session.on_stdout(&chunk);
                        shared.emit(status);
                        if let Some(message) = message {
                            let _ = events.send(Ok(message));
                        }
                        idle.as_mut()
                            .reset(tokio::time::Instant::now() + idle_window);
                        idle_armed = true;
                    }
                    Err(error) => {
                        tracing::warn!(session = %id, %error, "stdout read failed");
                        stdout_open = false;
                    }
                },

                read = stderr.read(&mut err_buf), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&err_buf[..n]);
                        shared.emit(session.on_stderr(&chunk));
                    }
                    Err(error) => {
                        tracing::warn!(session = %id, %error, "stderr read failed");
                        stderr_open = false;
                    }
                },

                () = shutdown.cancelled(), if !closing => {
                    closing = true;
                    session.on_close_requested();
                    tracing::debug!(session = %id, phase = ?session.phase(), "close requested");
                    terminate_child(&mut child);
                }

                () = &mut idle, if idle_armed => {
                    idle_armed = false;
                    if let Some(status) = session.on_idle() {
                        shared.emit(status);
                    }
                }

                wait = child.wait(), if exit_code.is_none() => match wait {
                    Ok(status) => exit_code = Some(status.code()),
                    Err(error) => {
                        tracing::error!(session = %id, %error, "wait on interpreter failed");
                        exit_code = Some(None);
                    }
                },
            }
        }

        let code = exit_code.flatten();
        tracing::info!(session = %id, code = ?code, "interpreter exited");

        // Release the slot first (only if it is still ours; a newer
        // one-shot spawn must not be clobbered), so a caller reacting to
        // the result below can immediately submit again.
        {
            let mut active = shared.active.lock().await;
            if active.as_ref().is_some_and(|session| session.id == id) {
                *active = None;
            }
        }

        let outcome = session.on_exit(code);
        if let Some(result) = outcome.result {
            let _ = events.send(result);
        }
        drop(events); // end-of-stream before the status clear delay
        shared.emit(outcome.status);

        tokio::time::sleep(clear_delay).await;
        shared.emit(StatusEvent::Cleared);
    }
}
