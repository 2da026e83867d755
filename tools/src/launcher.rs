//! Launching applied Python scripts in a new terminal window.
//!
//! The script runs detached; nothing waits for it or reads its output.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::ToolError;

/// Interpreter used when none is configured.
#[cfg(windows)]
pub const DEFAULT_INTERPRETER: &str = "python";
#[cfg(not(windows))]
pub const DEFAULT_INTERPRETER: &str = "python3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A terminal window was opened running the script.
    Launched { terminal: String },
    /// Launching is an admin-mode privilege.
    AdminDisabled,
    /// Only `.py` files are launched.
    NotAScript,
}

pub trait ScriptLauncher {
    fn launch(&mut self, script: &Path, admin_mode: bool) -> Result<LaunchOutcome, ToolError>;
}

/// One way of opening a terminal: the display name and the full argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCandidate {
    pub name: &'static str,
    pub argv: Vec<String>,
}

/// [`ScriptLauncher`] that tries the platform's known terminal emulators in order.
#[derive(Debug, Clone)]
pub struct TerminalLauncher {
    interpreter: String,
}

impl Default for TerminalLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl TerminalLauncher {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Terminal invocations for the current platform, in preference order.
    #[must_use]
    pub fn candidates(&self, script: &Path, dir: &Path) -> Vec<TerminalCandidate> {
        platform_candidates(&self.interpreter, script, dir)
    }
}

impl ScriptLauncher for TerminalLauncher {
    fn launch(&mut self, script: &Path, admin_mode: bool) -> Result<LaunchOutcome, ToolError> {
        if !admin_mode {
            return Ok(LaunchOutcome::AdminDisabled);
        }
        if !script.is_file() {
            return Err(ToolError::BadArgs {
                message: format!("Script not found: {}", script.display()),
            });
        }
        let is_python = script
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("py"));
        if !is_python {
            return Ok(LaunchOutcome::NotAScript);
        }

        let dir = script
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        for candidate in self.candidates(script, &dir) {
            let Some((program, args)) = candidate.argv.split_first() else {
                continue;
            };
            let spawned = Command::new(program)
                .args(args)
                .current_dir(&dir)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            match spawned {
                Ok(_) => {
                    info!(terminal = candidate.name, script = %script.display(), "Launched script");
                    return Ok(LaunchOutcome::Launched {
                        terminal: candidate.name.to_string(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(terminal = candidate.name, "Terminal not available");
                }
                Err(e) => {
                    return Err(ToolError::ExecutionFailed {
                        tool: "script launch".to_string(),
                        message: format!("{}: {e}", candidate.name),
                    });
                }
            }
        }

        Err(ToolError::Unsupported(format!(
            "Could not find a known terminal emulator to run {}. Run it manually with: {} \"{}\"",
            script.display(),
            self.interpreter,
            script.display()
        )))
    }
}

#[cfg(target_os = "macos")]
fn platform_candidates(interpreter: &str, script: &Path, dir: &Path) -> Vec<TerminalCandidate> {
    let line = format!(
        "cd \\\"{}\\\" && {interpreter} \\\"{}\\\"",
        dir.display(),
        script.display()
    );
    vec![TerminalCandidate {
        name: "Terminal",
        argv: vec![
            "osascript".to_string(),
            "-e".to_string(),
            format!("tell application \"Terminal\" to do script \"{line}\""),
        ],
    }]
}

#[cfg(windows)]
fn platform_candidates(interpreter: &str, script: &Path, dir: &Path) -> Vec<TerminalCandidate> {
    let title = script
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    vec![TerminalCandidate {
        name: "cmd",
        argv: vec![
            "cmd".to_string(),
            "/C".to_string(),
            "start".to_string(),
            format!("Running {title}"),
            "/D".to_string(),
            dir.display().to_string(),
            "cmd".to_string(),
            "/K".to_string(),
            interpreter.to_string(),
            script.display().to_string(),
        ],
    }]
}

#[cfg(not(any(target_os = "macos", windows)))]
fn platform_candidates(interpreter: &str, script: &Path, dir: &Path) -> Vec<TerminalCandidate> {
    let script = script.display().to_string();
    let dir = dir.display().to_string();
    vec![
        TerminalCandidate {
            name: "gnome-terminal",
            argv: vec![
                "gnome-terminal".to_string(),
                format!("--working-directory={dir}"),
                "--".to_string(),
                interpreter.to_string(),
                script.clone(),
            ],
        },
        TerminalCandidate {
            name: "konsole",
            argv: vec![
                "konsole".to_string(),
                "--workdir".to_string(),
                dir.clone(),
                "-e".to_string(),
                interpreter.to_string(),
                script.clone(),
            ],
        },
        TerminalCandidate {
            name: "xfce4-terminal",
            argv: vec![
                "xfce4-terminal".to_string(),
                format!("--working-directory={dir}"),
                "--command".to_string(),
                format!("{interpreter} \"{script}\""),
            ],
        },
        TerminalCandidate {
            name: "xterm",
            argv: vec![
                "xterm".to_string(),
                "-e".to_string(),
                format!(
                    "cd \"{dir}\" && {interpreter} \"{script}\" ; read -p 'Press Enter to close...'"
                ),
            ],
        },
    ]
}
