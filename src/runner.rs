//! Running compose commands.
//!
//! Blocking actions (`up`, `down`) are awaited and mapped to a `RunError` on
//! failure. The streaming action (`logs --follow`) hands its child to a relay
//! task that forwards each output line to the event channel; the returned
//! `LogSession` ties the child's lifetime to whoever holds it.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::output::StreamKind;
use crate::process::{CommandOutput, CommandSpec};

/// Time a streaming child gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a command could not be run or did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("{tool} not found. Please make sure it is installed and in your PATH.")]
    ToolNotFound { tool: String },
    #[error("Failed to run command: {command}\n\n{stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("An error occurred: {message}")]
    Launch { message: String },
}

impl RunError {
    /// Exit code for headless mode: 127 when the tool is missing, like a shell.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::ToolNotFound { .. } => 127,
            RunError::Failed { .. } | RunError::Launch { .. } => 1,
        }
    }
}

/// Runs `spec` to completion. Succeeds iff the exit code is zero.
pub async fn run_blocking(spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    let program = resolve_program(&spec.program)?;
    check_cwd(spec)?;

    let mut command = Command::new(&program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!(command = %spec, cwd = %spec.cwd.display(), "running command");
    let output = command
        .output()
        .await
        .map_err(|err| launch_error(spec, err))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        info!(command = %spec, "command succeeded");
        Ok(CommandOutput { stdout, stderr })
    } else {
        let code = output.status.code();
        warn!(command = %spec, code = ?code, "command failed");
        Err(RunError::Failed {
            command: spec.to_string(),
            code,
            stderr: stderr.trim_end().to_string(),
        })
    }
}

/// Launches `spec` and relays its output to `tx` as `Event::LogLine`s tagged
/// with `session`, followed by one `Event::LogEnded`.
///
/// Must be called from within a tokio runtime.
pub fn run_streaming(
    spec: &CommandSpec,
    session: u64,
    tx: mpsc::Sender<Event>,
) -> Result<LogSession, RunError> {
    let program = resolve_program(&spec.program)?;
    check_cwd(spec)?;

    let mut command = Command::new(&program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    let child = command.spawn().map_err(|err| launch_error(spec, err))?;
    let pid = child.id();
    info!(command = %spec, session, pid = ?pid, "log session started");

    let (cancel_tx, cancel_rx) = oneshot::channel();
    let relay = tokio::spawn(relay_output(session, child, tx, cancel_rx));
    Ok(LogSession {
        id: session,
        pid,
        cancel: Some(cancel_tx),
        relay: Some(relay),
    })
}

/// Handle for a running streaming command.
///
/// Dropping it cancels the relay, which terminates the child.
#[derive(Debug)]
pub struct LogSession {
    id: u64,
    pid: Option<u32>,
    cancel: Option<oneshot::Sender<()>>,
    relay: Option<JoinHandle<()>>,
}

impl LogSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Terminates the child and waits for the relay to report the end.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(relay) = self.relay.take() {
            if tokio::time::timeout(STOP_TIMEOUT, relay).await.is_err() {
                warn!(session = self.id, "log relay did not finish in time");
            }
        }
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

enum Finish {
    Exited(io::Result<ExitStatus>),
    Cancelled,
}

async fn relay_output(
    session: u64,
    mut child: Child,
    tx: mpsc::Sender<Event>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(read_stream(session, StreamKind::Stderr, stderr, tx.clone())));

    let mut cancelled = false;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let next = tokio::select! {
                _ = &mut cancel => {
                    cancelled = true;
                    break;
                }
                next = lines.next_line() => next,
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(session, error = %err, "failed to read log stream");
                    break;
                }
            };
            // A full channel must not hide a stop request.
            let event = Event::LogLine { session, line, stream: StreamKind::Stdout };
            tokio::select! {
                _ = &mut cancel => {
                    cancelled = true;
                    break;
                }
                sent = tx.send(event) => {
                    if sent.is_err() {
                        // nobody is reading any more
                        cancelled = true;
                        break;
                    }
                }
            }
        }
    }

    let mut finish = if cancelled {
        Finish::Cancelled
    } else {
        tokio::select! {
            status = child.wait() => Finish::Exited(status),
            _ = &mut cancel => Finish::Cancelled,
        }
    };

    // Everything the child wrote to stderr goes out before `LogEnded`.
    if matches!(finish, Finish::Exited(_)) {
        if let Some(task) = stderr_task.as_mut() {
            tokio::select! {
                _ = task => {}
                _ = &mut cancel => finish = Finish::Cancelled,
            }
        }
    }

    let status = match finish {
        Finish::Exited(status) => status,
        Finish::Cancelled => {
            cancelled = true;
            if let Some(task) = stderr_task.take() {
                task.abort();
            }
            terminate(&mut child).await;
            child.wait().await
        }
    };
    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(session, error = %err, "failed to reap log process");
            None
        }
    };
    debug!(session, code = ?code, cancelled, "log session ended");
    let ended = Event::LogEnded { session, code, cancelled };
    if cancelled {
        // whoever stopped us may no longer be draining the channel
        let _ = tx.try_send(ended);
    } else {
        tokio::select! {
            _ = tx.send(ended) => {}
            _ = &mut cancel => {}
        }
    }
}

async fn read_stream<R>(session: u64, stream: StreamKind, reader: R, tx: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx
            .send(Event::LogLine { session, line, stream })
            .await
            .is_err()
        {
            break;
        }
    }
}

// SIGTERM the whole process group first so compose can shut its attached
// log streams down, then fall back to a hard kill.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                let _ = libc::kill(-(pid as i32), libc::SIGTERM);
            }
            if let Ok(Ok(_)) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                return;
            }
            unsafe {
                let _ = libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

fn resolve_program(program: &str) -> Result<PathBuf, RunError> {
    which::which(program).map_err(|err| {
        debug!(program, error = %err, "program lookup failed");
        RunError::ToolNotFound {
            tool: program.to_string(),
        }
    })
}

fn check_cwd(spec: &CommandSpec) -> Result<(), RunError> {
    if spec.cwd.is_dir() {
        Ok(())
    } else {
        Err(RunError::Launch {
            message: format!("working directory {} does not exist", spec.cwd.display()),
        })
    }
}

fn launch_error(spec: &CommandSpec, err: io::Error) -> RunError {
    warn!(command = %spec, error = %err, "failed to launch command");
    RunError::Launch {
        message: format!("failed to launch {}: {}", spec, err),
    }
}
