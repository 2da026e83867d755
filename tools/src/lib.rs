//! Tools for Scribe - change parsing, path sandboxing, and external process collaborators.
//!
//! - [`ChangeParser`]: `# FILEPATH:` proposals from model replies
//! - [`ProjectSandbox`]: path resolution confined to the project root
//! - [`TestRunner`], [`ScriptLauncher`], [`CaptureSource`]: process-backed collaborators
//!   with bounded waits where the operation can hang

pub mod capture;
pub mod change_parser;
pub mod launcher;
pub mod process;
pub mod runner;
pub mod sandbox;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use capture::{CaptureSource, CommandCapture, default_capture_command};
pub use change_parser::{
    ChangeParser, ParseOutcome, RawBlock, RejectedProposal, normalize_content, normalize_identifier,
    scan_blocks,
};
pub use launcher::{LaunchOutcome, ScriptLauncher, TerminalLauncher};
pub use process::CommandOutput;
pub use runner::{ShellTestRunner, TestRunner, full_command};
pub use sandbox::{ProjectSandbox, Resolution, ResolvedTarget, lexical_normalize};

/// Tool error types.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("{tool} timed out after {}s", .elapsed.as_secs())]
    Timeout { tool: String, elapsed: Duration },
    #[error("Sandbox violation: {0}")]
    SandboxViolation(DenialReason),
    #[error("{tool} failed: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Executable '{program}' not found. Ensure it's in your PATH or provide an absolute path.")]
    NotFound { program: String },
    #[error("{0}")]
    Unsupported(String),
}

impl ToolError {
    /// Whether this error is a bounded-wait expiry rather than a command failure.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

/// Why a path was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    PathOutsideSandbox {
        attempted: PathBuf,
        resolved: PathBuf,
    },
    SymlinkEscape {
        attempted: PathBuf,
        resolved: PathBuf,
    },
    UnsafeCharacters {
        attempted: String,
    },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::PathOutsideSandbox {
                attempted,
                resolved,
            } => write!(
                f,
                "Path outside project (attempted: {}, resolved: {})",
                attempted.display(),
                resolved.display()
            ),
            DenialReason::SymlinkEscape {
                attempted,
                resolved,
            } => write!(
                f,
                "Path escapes project through a symlink (attempted: {}, resolved: {})",
                attempted.display(),
                resolved.display()
            ),
            DenialReason::UnsafeCharacters { attempted } => {
                write!(f, "Path contains control characters: {attempted:?}")
            }
        }
    }
}
