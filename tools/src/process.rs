//! Subprocess execution with a bounded wait.

use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

use crate::ToolError;

/// Grace period for a killed child to be reaped.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Call `disarm()` after the process exits normally to prevent the kill.
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// Put the child in its own session so `ChildGuard` can kill the whole group.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Platform shell invocation for a command line.
#[must_use]
pub fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// Spawn `cmd` in `cwd`, wait up to `timeout`, and capture its output.
///
/// `tool` names the operation in errors. Expiry yields [`ToolError::Timeout`],
/// never a non-zero exit.
pub async fn run_with_timeout(
    tool: &str,
    mut cmd: Command,
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    set_new_session(&mut cmd);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let child = cmd.spawn().map_err(|e| spawn_error(tool, &program, &e))?;
    let mut guard = ChildGuard::new(child);
    let started = Instant::now();

    let Some(child) = guard.child_mut() else {
        return Err(ToolError::ExecutionFailed {
            tool: tool.to_string(),
            message: "child process handle missing".to_string(),
        });
    };
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let collect = async {
        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let status = child.wait().await;
        (status, stdout, stderr)
    };

    let (status, stdout, stderr) = if let Ok(done) = time::timeout(timeout, collect).await {
        done
    } else {
        warn!(tool, elapsed_ms = started.elapsed().as_millis() as u64, "Command timed out");
        if let Some(child) = guard.child_mut() {
            let _ = child.start_kill();
            let _ = time::timeout(KILL_GRACE, child.wait()).await;
        }
        return Err(ToolError::Timeout {
            tool: tool.to_string(),
            elapsed: timeout,
        });
    };

    guard.disarm();
    let status = status.map_err(|e| ToolError::ExecutionFailed {
        tool: tool.to_string(),
        message: e.to_string(),
    })?;
    debug!(tool, code = ?status.code(), "Command finished");

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn spawn_error(tool: &str, program: &str, err: &io::Error) -> ToolError {
    if err.kind() == ErrorKind::NotFound {
        ToolError::NotFound {
            program: program.to_string(),
        }
    } else {
        ToolError::ExecutionFailed {
            tool: tool.to_string(),
            message: format!("failed to spawn {program}: {err}"),
        }
    }
}
