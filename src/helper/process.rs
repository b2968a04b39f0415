// ABOUTME: Runs the signing helper with the connection socket and piped stdio.
// ABOUTME: Feeds stdin and collects output until the child exits, within a timeout.

use super::error::{ExitFailure, HelperError};
use bytes::Bytes;
use command_fds::{CommandFdExt, FdMapping};
use std::os::fd::{BorrowedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

pub const DEFAULT_KEYSIGN_PATH: &str = "/usr/libexec/openssh/ssh-keysign";

/// Descriptor number the helper finds the connection socket on.
pub const DEFAULT_HELPER_FD: RawFd = 3;

pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to keep reading output after the helper itself has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// How to invoke the signing helper.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Path to the helper executable. It is run without arguments.
    pub program: PathBuf,
    /// Descriptor index of the inherited socket in the child.
    pub socket_fd: RawFd,
    /// Upper bound on the helper's lifetime.
    pub timeout: Duration,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_KEYSIGN_PATH),
            socket_fd: DEFAULT_HELPER_FD,
            timeout: DEFAULT_HELPER_TIMEOUT,
        }
    }
}

impl HelperConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn socket_fd(mut self, fd: RawFd) -> Self {
        self.socket_fd = fd;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Everything the helper produced before exiting.
struct Completed {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// One-shot runner for the signing helper.
#[derive(Debug, Clone)]
pub struct HelperProcess {
    config: HelperConfig,
}

impl HelperProcess {
    pub fn new(config: HelperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HelperConfig {
        &self.config
    }

    /// Run the helper on `request` and return its stdout.
    ///
    /// The socket is duplicated and mapped onto `socket_fd` in the child only.
    /// Every descriptor opened here is closed before returning, and the child
    /// has been reaped on every path.
    pub async fn run(&self, socket: BorrowedFd<'_>, request: &[u8]) -> Result<Bytes, HelperError> {
        let mut child = self.spawn(socket)?;
        tracing::debug!(
            program = %self.config.program.display(),
            pid = child.id(),
            "spawned signing helper"
        );

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let io = transfer(
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
            request,
            &mut stdout,
            &mut stderr,
        );
        let status = self.supervise(&mut child, io).await?;

        Self::interpret(Completed {
            status,
            stdout,
            stderr,
        })
    }

    /// Wait for the helper to exit while `io` moves its stdio, within the timeout.
    ///
    /// On any failure the child is killed and reaped before the error returns.
    async fn supervise<F>(&self, child: &mut Child, io: F) -> Result<ExitStatus, HelperError>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let outcome = tokio::time::timeout(self.config.timeout, wait_with_io(child, io)).await;

        let error = match outcome {
            Ok(Ok(status)) => return Ok(status),
            Ok(Err(e)) => {
                tracing::warn!("signing helper I/O failed, killing it: {}", e);
                HelperError::Io(e)
            }
            Err(_) => {
                tracing::warn!(
                    "signing helper exceeded {:?}, killing it",
                    self.config.timeout
                );
                HelperError::Timeout(self.config.timeout)
            }
        };
        reap(child).await;
        Err(error)
    }

    fn spawn(&self, socket: BorrowedFd<'_>) -> Result<Child, HelperError> {
        // The duplicate is close-on-exec in this process; the mapping dup2s it
        // onto socket_fd in the child, where it stays open across exec.
        let duplicate = socket.try_clone_to_owned()?;

        let mut command = Command::new(&self.config.program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
            .fd_mappings(vec![FdMapping {
                parent_fd: duplicate,
                child_fd: self.config.socket_fd,
            }])
            .map_err(|e| HelperError::FdMapping {
                fd: self.config.socket_fd,
                reason: e.to_string(),
            })?;

        // `command` owns the duplicate and closes it when dropped at return.
        command.spawn().map_err(|source| HelperError::Spawn {
            program: self.config.program.clone(),
            source,
        })
    }

    fn interpret(completed: Completed) -> Result<Bytes, HelperError> {
        let stderr = String::from_utf8_lossy(&completed.stderr).into_owned();

        if completed.status.success() {
            if !stderr.is_empty() {
                tracing::debug!(stderr = %stderr, "signing helper succeeded with diagnostics");
            }
            return Ok(Bytes::from(completed.stdout));
        }

        let failure = if !stderr.is_empty() {
            ExitFailure::Stderr(stderr)
        } else if let Some(code) = completed.status.code() {
            ExitFailure::Code(code)
        } else {
            ExitFailure::Signal(completed.status.signal().unwrap_or_default())
        };
        tracing::debug!(status = %completed.status, "signing helper failed");
        Err(HelperError::Exit(failure))
    }
}

/// Write the request and close stdin so the helper sees EOF.
///
/// A helper that exits without reading its input is reported through its exit
/// status, so a broken pipe here is not an error on its own.
async fn write_request(stdin: Option<ChildStdin>, request: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    let written = match stdin.write_all(request).await {
        Ok(()) => stdin.shutdown().await,
        Err(e) => Err(e),
    };
    match written {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!("signing helper closed stdin before reading the request");
            Ok(())
        }
        other => other,
    }
}

/// Feed stdin and drain stdout/stderr until both reach EOF.
///
/// Output lands in the caller's buffers as it arrives, so whatever was read
/// survives if this future is dropped early.
async fn transfer(
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    request: &[u8],
    stdout_buf: &mut Vec<u8>,
    stderr_buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    tokio::try_join!(
        write_request(stdin, request),
        read_into(stdout, stdout_buf),
        read_into(stderr, stderr_buf),
    )?;
    Ok(())
}

async fn read_into<R: AsyncRead + Unpin>(
    stream: Option<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    let Some(mut stream) = stream else {
        return Ok(());
    };
    while stream.read_buf(buf).await? > 0 {}
    Ok(())
}

enum FirstDone {
    Io(std::io::Result<()>),
    Exit(std::io::Result<ExitStatus>),
}

/// Completion is the child's exit, not EOF on its pipes: a descendant that
/// inherited stdout or stderr may keep them open long after the helper is gone.
async fn wait_with_io<F>(child: &mut Child, io: F) -> std::io::Result<ExitStatus>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(io);
    let first = tokio::select! {
        result = &mut io => FirstDone::Io(result),
        status = child.wait() => FirstDone::Exit(status),
    };

    match first {
        FirstDone::Io(result) => {
            result?;
            child.wait().await
        }
        FirstDone::Exit(status) => {
            let status = status?;
            match tokio::time::timeout(DRAIN_GRACE, io).await {
                Ok(result) => result?,
                Err(_) => tracing::debug!(
                    "signing helper exited but its output pipes are still open, keeping what was read"
                ),
            }
            Ok(status)
        }
    }
}

/// Kill the child if it is still running and wait for it.
async fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    // kill() also waits, so no zombie is left behind.
    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill signing helper: {}", e);
    }
}
