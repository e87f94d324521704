//! Child process execution with a hard wall-clock limit.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::action::ActionResult;

/// How long to keep draining pipes after the child has exited or been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Raw outcome of one child process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    /// `None` when the limit expired and the process tree was killed.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    /// Convert into the uniform result. `reported_timeout` is the limit quoted
    /// in the timed-out error message.
    pub fn into_action_result(self, reported_timeout: Duration) -> ActionResult {
        let Some(status) = self.status else {
            return ActionResult {
                stdout: Some(self.stdout),
                stderr: Some(self.stderr),
                ..ActionResult::timed_out(reported_timeout.as_secs())
            };
        };
        let error = match status.code() {
            Some(_) => None,
            None => Some(format!("Command terminated by signal ({status})")),
        };
        ActionResult {
            success: status.success(),
            returncode: status.code(),
            stdout: Some(self.stdout),
            stderr: Some(self.stderr),
            error,
            ..ActionResult::default()
        }
    }
}

/// Spawn `cmd` and wait at most `limit` for it to exit.
///
/// The child leads a fresh process group. Once the child exits, or when the
/// limit expires, the whole group receives SIGKILL, so descendants spawned
/// by a shell never outlive the action.
pub(crate) async fn run_with_timeout(mut cmd: Command, limit: Duration) -> io::Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let pgid = child.id();
    let stdout = child.stdout.take().map(Capture::spawn);
    let stderr = child.stderr.take().map(Capture::spawn);

    let status = match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status?;
            // Background jobs left by the shell still hold the pipes.
            if let Some(pgid) = pgid {
                kill_process_group(pgid);
            }
            Some(status)
        }
        Err(_) => {
            if let Some(pgid) = pgid {
                kill_process_group(pgid);
            }
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "child already gone after group kill");
            }
            None
        }
    };
    let duration = start.elapsed();

    let (stdout, stderr) = tokio::join!(Capture::finish(stdout), Capture::finish(stderr));
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        duration,
    })
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; pgid is the group this child leads
    // because it was spawned with process_group(0).
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    // ESRCH: the group already emptied, the common case after a clean exit.
    if rc != 0 && io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH) {
        tracing::debug!(pgid, error = %io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// One output pipe being drained in the background. Bytes land in a shared
/// buffer as they arrive, so whatever was read survives an aborted drain.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(drain(pipe, buf.clone()));
        Self { buf, task }
    }

    /// Wait up to [`DRAIN_GRACE`] for EOF, then keep what was read. A
    /// descendant that left the process group may hold the pipe open.
    async fn finish(capture: Option<Self>) -> String {
        let Some(Capture { buf, mut task }) = capture else {
            return String::new();
        };
        match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "drain task failed"),
            Err(_) => {
                tracing::debug!("pipe still open after grace period, keeping partial output");
                task.abort();
            }
        }
        let bytes = buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = buf.lock().unwrap_or_else(PoisonError::into_inner);
                captured.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                tracing::debug!(error = %e, "pipe read failed");
                break;
            }
        }
    }
}
