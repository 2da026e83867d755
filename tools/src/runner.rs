//! Configured test command execution.

use std::path::Path;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::ToolError;
use crate::process::{CommandOutput, run_with_timeout, shell_command};

/// Upper bound on a single test run.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs the project's test command and reports its output.
pub trait TestRunner {
    fn run(
        &mut self,
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, ToolError>;
}

/// The command line as executed: `command` followed by space-joined `args`.
#[must_use]
pub fn full_command(command: &str, args: &[String]) -> String {
    let mut line = command.trim().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// [`TestRunner`] that hands the command line to the platform shell.
pub struct ShellTestRunner {
    runtime: Runtime,
    timeout: Duration,
}

impl ShellTestRunner {
    pub fn new() -> Result<Self, ToolError> {
        Self::with_timeout(DEFAULT_TEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ToolError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool: "test runner".to_string(),
                message: format!("failed to start runtime: {e}"),
            })?;
        Ok(Self { runtime, timeout })
    }
}

impl TestRunner for ShellTestRunner {
    fn run(
        &mut self,
        command: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, ToolError> {
        if command.trim().is_empty() {
            return Err(ToolError::BadArgs {
                message: "test command is empty".to_string(),
            });
        }
        let line = full_command(command, args);
        info!(command = %line, cwd = %cwd.display(), "Running test command");
        self.runtime.block_on(run_with_timeout(
            "test command",
            shell_command(&line),
            cwd,
            self.timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_command_joins_args_with_spaces() {
        assert_eq!(full_command("pytest", &[]), "pytest");
        assert_eq!(
            full_command(" pytest ", &["-q".to_string(), "tests/".to_string()]),
            "pytest -q tests/"
        );
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = ShellTestRunner::new().expect("runner");
        let err = runner.run("  ", &[], dir.path()).expect_err("empty");
        assert!(matches!(err, ToolError::BadArgs { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn reports_exit_code_and_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = ShellTestRunner::new().expect("runner");
        let output = runner
            .run("echo", &["ran".to_string()], dir.path())
            .expect("runs");
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "ran");

        let failing = runner.run("exit 2", &[], dir.path()).expect("runs");
        assert_eq!(failing.exit_code, Some(2));
    }

    #[cfg(unix)]
    #[test]
    fn long_running_command_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut runner = ShellTestRunner::with_timeout(Duration::from_millis(100)).expect("runner");
        let err = runner.run("sleep", &["5".to_string()], dir.path()).expect_err("timeout");
        assert!(err.is_timeout());
    }
}
