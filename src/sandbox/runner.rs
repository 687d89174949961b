// ABOUTME: Runs approved commands through the host shell with a hard timeout.
// ABOUTME: Output is captured into bounded buffers; the process group is killed on timeout and after exit.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit code reported for a command killed on timeout (128 + SIGKILL).
pub const KILLED_EXIT_CODE: i32 = 137;

/// Per-stream capture limit. Anything beyond it is read and discarded.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// How long to wait for the output readers once the process group is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// What a finished (or killed) command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
    /// Either stream exceeded `MAX_OUTPUT_BYTES`.
    pub truncated: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Executes a shell command string.
///
/// `Err` means the command could not be started at all; a command that ran
/// and failed is an `Ok` with a non-zero exit code.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> io::Result<RunOutput>;
}

/// Runs commands with `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> io::Result<RunOutput> {
        let start = Instant::now();
        let mut cmd = shell_command(command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        // Drain both pipes while waiting so a chatty child never blocks on a full pipe.
        let stdout_buf = SharedCapture::default();
        let stderr_buf = SharedCapture::default();
        let stdout_task = tokio::spawn(capture(child.stdout.take(), stdout_buf.clone()));
        let stderr_task = tokio::spawn(capture(child.stderr.take(), stderr_buf.clone()));

        let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                // Background jobs left behind by the shell would hold the pipes open.
                kill_process_group(pid);
                (Some(status), false)
            }
            Err(_) => {
                warn!(command, timeout_ms = timeout.as_millis() as u64, "command timed out; killing");
                if !kill_process_group(pid) {
                    if let Err(e) = child.start_kill() {
                        debug!(error = %e, "failed to kill command");
                    }
                }
                if let Err(e) = child.wait().await {
                    debug!(error = %e, "failed to reap killed command");
                }
                (None, true)
            }
        };

        let (stdout, stdout_truncated) = join_reader(stdout_task, &stdout_buf).await;
        let (stderr, stderr_truncated) = join_reader(stderr_task, &stderr_buf).await;

        let exit_code = match status {
            Some(status) => status_code(status),
            None => KILLED_EXIT_CODE,
        };

        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
            duration: start.elapsed(),
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

/// Bytes captured from one stream so far.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Shared with the reader task so output survives if the task is cut off.
#[derive(Debug, Clone, Default)]
struct SharedCapture(Arc<Mutex<Captured>>);

impl SharedCapture {
    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> (String, bool) {
        let captured = std::mem::take(&mut *self.lock());
        (
            String::from_utf8_lossy(&captured.bytes).into_owned(),
            captured.truncated,
        )
    }
}

/// Keep up to `MAX_OUTPUT_BYTES`, then drain and discard the rest.
async fn capture<R: AsyncRead + Unpin>(reader: Option<R>, sink: SharedCapture) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut out = sink.lock();
                let keep = n.min(MAX_OUTPUT_BYTES.saturating_sub(out.bytes.len()));
                out.bytes.extend_from_slice(&chunk[..keep]);
                if keep < n {
                    out.truncated = true;
                }
            }
            Err(e) => {
                debug!(error = %e, "output read failed");
                break;
            }
        }
    }
}

async fn join_reader(mut task: JoinHandle<()>, buf: &SharedCapture) -> (String, bool) {
    match tokio::time::timeout(READER_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "output reader task failed"),
        Err(_) => {
            // A descendant that left the process group (setsid) still holds the pipe.
            debug!("output pipe still open after the command exited; keeping partial output");
            task.abort();
        }
    }
    buf.take()
}

/// SIGKILL the process group led by `pid`. Returns whether the signal was sent.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    // SAFETY: kill(2) with a negative pid signals the process group the child
    // leads (it was spawned with process_group(0)).
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pid, error = %err, "process group kill failed");
        }
    }
    rc == 0
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) -> bool {
    false
}

fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_secs(10);

    async fn run(command: &str) -> RunOutput {
        let dir = std::env::temp_dir();
        ShellRunner.run(command, &dir, SHORT).await.unwrap()
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run("echo hello").await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "hello\n");
        assert!(out.stderr.is_empty());
        assert!(out.success());
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn captures_stderr_and_nonzero_exit() {
        let out = run("echo oops >&2; exit 3").await;
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr, "oops\n");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellRunner.run("pwd", dir.path(), SHORT).await.unwrap();
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(out.stdout.trim_end().ends_with(name), "{}", out.stdout);
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let dir = std::env::temp_dir();
        let started = Instant::now();
        let out = ShellRunner
            .run("echo started; sleep 5", &dir, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, KILLED_EXIT_CODE);
        assert!(!out.success());
        assert_eq!(out.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn background_jobs_are_killed_when_the_shell_exits() {
        let started = Instant::now();
        let out = run("echo hi; sleep 30 &").await;
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
        assert_eq!(out.stdout, "hi\n");
        // The sleep held stdout open; returning before the reader grace means it died.
        assert!(started.elapsed() < READER_GRACE, "{:?}", started.elapsed());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn output_survives_a_detached_descendant() {
        let out = run("echo kept; setsid sleep 5 &").await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "kept\n");
    }

    #[tokio::test]
    async fn output_is_bounded() {
        let out = run("head -c 100000 /dev/zero | tr '\\0' 'a'").await;
        assert_eq!(out.stdout.len(), MAX_OUTPUT_BYTES);
        assert!(out.truncated);
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn missing_directory_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(ShellRunner.run("true", &missing, SHORT).await.is_err());
    }

    #[tokio::test]
    async fn signal_exit_maps_to_128_plus_signal() {
        let out = run("kill -TERM $$").await;
        assert_eq!(out.exit_code, 128 + libc::SIGTERM);
    }
}
