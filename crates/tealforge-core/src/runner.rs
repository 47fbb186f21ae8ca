//! Compiler subprocess execution
//!
//! The child runs with stdin closed and both output streams drained
//! incrementally into shared buffers, so whatever was written before a
//! timeout is still available for the error. On unix the child leads its
//! own process group and a timeout kills the whole group; the child is
//! reaped before the timeout is reported. The group is also killed when
//! [`ProcessRunner::run`] is dropped before the child has been reaped, so
//! a cancelled request leaves no descendants behind.

use crate::invocation::Invocation;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Known teardown noise from the TEALScript toolchain: the compile succeeds
/// but disposal of a resource fails and the process exits non-zero.
pub const SUPPRESSED_DISPOSAL_ERROR: &str = "SuppressedError: An error was suppressed during disposal.";

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, non-zero only when tolerated as benign
    pub exit_code: i32,
}

/// Subprocess failure modes
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("process timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, stderr: String },

    #[error("process exited with code {code:?}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("process I/O error: {0}")]
    Io(#[from] io::Error),
}

type Capture = Arc<Mutex<Vec<u8>>>;

/// Runs compiler invocations, tolerating an allow-list of benign stderr.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    benign_stderr: Vec<String>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(vec![SUPPRESSED_DISPOSAL_ERROR.to_string()])
    }
}

impl ProcessRunner {
    pub fn new(benign_stderr: Vec<String>) -> Self {
        Self { benign_stderr }
    }

    /// True only when the whole of `stderr`, trimmed, equals an allow-listed entry.
    pub fn is_benign(&self, stderr: &str) -> bool {
        let stderr = stderr.trim();
        !stderr.is_empty() && self.benign_stderr.iter().any(|known| known.trim() == stderr)
    }

    pub async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, RunError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunError::Launch {
            program: invocation.program.clone(),
            source,
        })?;
        // Captured up front: `id()` is gone once the child has been reaped.
        let pid = child.id();
        // Declared after `child` so it drops first, while the group still exists.
        let mut group = GroupGuard::new(pid);

        let stdout_buf = Capture::default();
        let stderr_buf = Capture::default();
        let mut stdout_task = spawn_capture(child.stdout.take(), stdout_buf.clone());
        let mut stderr_task = spawn_capture(child.stderr.take(), stderr_buf.clone());

        let waited = tokio::time::timeout(invocation.timeout, async {
            let status = child.wait().await?;
            // Pipes close once the child and anything it forked are gone.
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            Ok::<ExitStatus, io::Error>(status)
        })
        .await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                terminate(&mut child, pid).await;
                group.disarm();
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunError::Io(err));
            }
            Err(_) => {
                terminate(&mut child, pid).await;
                group.disarm();
                stdout_task.abort();
                stderr_task.abort();
                let stderr = drain(&stderr_buf).await;
                tracing::warn!(
                    program = %invocation.program,
                    timeout_ms = invocation.timeout.as_millis() as u64,
                    "compiler timed out and was killed"
                );
                return Err(RunError::Timeout {
                    timeout_ms: invocation.timeout.as_millis() as u64,
                    stderr,
                });
            }
        };

        // Reaped and drained; the pgid may be reused from here on.
        group.disarm();
        let stdout = drain(&stdout_buf).await;
        let stderr = drain(&stderr_buf).await;

        match status.code() {
            Some(0) => Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code: 0,
            }),
            Some(code) if self.is_benign(&stderr) => {
                tracing::debug!(code, "ignoring benign compiler teardown error");
                Ok(ProcessOutput {
                    stdout,
                    stderr,
                    exit_code: code,
                })
            }
            code => Err(RunError::Exit { code, stderr }),
        }
    }
}

fn spawn_capture<R>(reader: Option<R>, sink: Capture) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    tracing::debug!(error = %err, "compiler output stream closed with error");
                    break;
                }
            }
        }
    })
}

async fn drain(buf: &Capture) -> String {
    String::from_utf8_lossy(&buf.lock().await).into_owned()
}

/// SIGKILL the child (and its process group on unix), then reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.kill().await {
        tracing::debug!(error = %err, "failed to kill compiler process");
    }
}

/// Kills the child's process group on drop unless disarmed.
///
/// `kill_on_drop` only reaches the direct child; anything it forked would
/// otherwise outlive a dropped `run` future with no timer left to stop it.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        tracing::debug!(pgid, "compile cancelled, killing compiler process group");
        #[cfg(unix)]
        kill_process_group(pgid);
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this child.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            error = %io::Error::last_os_error(),
            pgid,
            "failed to signal compiler process group"
        );
    }
}
