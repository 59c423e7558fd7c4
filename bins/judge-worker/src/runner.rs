// Single-process execution with a hard wall-clock deadline

use judge_common::types::ExecuteMessage;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

/// Per-stream capture ceiling. A program that keeps writing past it loses its pipe.
pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The program could not be started at all (missing binary, permissions)
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process finished on its own, with any exit status
    Exited(ExecuteMessage),
    /// The process was still alive at the deadline and was killed
    TimedOut(ExecuteMessage),
}

impl RunOutcome {
    pub fn message(&self) -> &ExecuteMessage {
        match self {
            RunOutcome::Exited(msg) | RunOutcome::TimedOut(msg) => msg,
        }
    }
}

/// Spawn `command`, feed its stdin, capture stdout/stderr and wait at most `timeout_ms`.
///
/// Timeouts are reported as `RunOutcome::TimedOut`, not as an error, so callers can tell
/// a slow program from a crashed one. Errors mean the runtime environment itself failed.
pub async fn run(command: &CommandSpec, timeout_ms: u64) -> Result<RunOutcome, RunnerError> {
    let io_error = |source: io::Error| RunnerError::Io {
        program: command.program.clone(),
        source,
    };

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &command.current_dir {
        cmd.current_dir(dir);
    }
    // Own process group, so background children can be killed with the program
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        program: command.program.clone(),
        source,
    })?;

    let pgid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let input = command.stdin.as_deref().unwrap_or_default();

    let deadline = Duration::from_millis(timeout_ms);
    let waited = tokio::time::timeout(deadline, async {
        tokio::try_join!(
            feed_stdin(stdin, input),
            read_capped(stdout),
            read_capped(stderr),
            async {
                let status = child.wait().await?;
                // Leftovers would keep the output pipes open
                kill_process_group(pgid);
                Ok::<_, io::Error>(status)
            },
        )
    })
    .await;

    match waited {
        Ok(Ok(((), out, err, status))) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let mut stderr = String::from_utf8_lossy(&err).into_owned();
            let exit_code = status.code();

            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!("[terminated by signal {}]", signal));
                }
            }

            debug!(
                command = %command.display(),
                exit_code = ?exit_code,
                elapsed_ms,
                "Process exited"
            );

            Ok(RunOutcome::Exited(ExecuteMessage {
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr,
                exit_code,
                elapsed_ms,
                timed_out: false,
            }))
        }
        Ok(Err(source)) => Err(io_error(source)),
        Err(_) => {
            kill_process_group(pgid);
            if let Err(e) = child.start_kill() {
                warn!(command = %command.display(), error = %e, "Failed to kill timed-out process");
            }
            if let Err(e) = child.wait().await {
                warn!(command = %command.display(), error = %e, "Failed to reap timed-out process");
            }

            let elapsed_ms = (start.elapsed().as_millis() as u64).max(timeout_ms);
            debug!(command = %command.display(), elapsed_ms, timeout_ms, "Process timed out");

            Ok(RunOutcome::TimedOut(ExecuteMessage {
                stdout: String::new(),
                stderr: format!("Execution timed out after {}ms", timeout_ms),
                exit_code: None,
                elapsed_ms,
                timed_out: true,
            }))
        }
    }
}

async fn feed_stdin(pipe: Option<ChildStdin>, input: &str) -> io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };

    // A program that never reads its input closes the pipe early; that is its business.
    match pipe.write_all(input.as_bytes()).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(e) => return Err(e),
    }
    match pipe.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

/// SIGKILL whatever is left in the process group led by `pgid`
#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()).filter(|id| *id > 0) else {
        return;
    };
    // ESRCH only means the group is already empty
    unsafe {
        let _ = libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        let mut limited = pipe.take(MAX_CAPTURED_OUTPUT_BYTES as u64);
        limited.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
