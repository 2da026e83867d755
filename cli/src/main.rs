//! Scribe CLI - binary entry point and line-oriented terminal front end.
//!
//! The CLI owns everything terminal-shaped: line editing, styling, and the
//! log file. [`scribe_engine`] drives the session through the [`Console`] seam.
//!
//! ```text
//! main() -> AppConfig::load() -> resolve() -> init_tracing() -> start_session()
//!                                                                   |
//!                                                                   v
//!                                    readline ─▶ Session::handle_line ─▶ Flow
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io::{Write, stdout},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
};

use anyhow::{Context, Result};
use crossterm::{
    cursor::MoveTo,
    execute,
    style::Stylize,
    terminal::{Clear, ClearType},
};
use rustyline::{
    Config as ReadlineConfig, Context as ReadlineContext, Editor, Helper,
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use scribe_config::{AppConfig, scribe_home};
use scribe_engine::{Console, Flow, Session, command_names, start_session};

fn init_tracing(configured: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file(&log_file_candidates(configured));

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Logs never go to the terminal; they would interleave with the REPL.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file(candidates: &[PathBuf]) -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(candidate) {
            Ok(file) => return (Some((candidate.clone(), file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates(configured: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![configured.to_path_buf()];

    let home_log = scribe_home().join("logs").join("scribe.log");
    if !candidates.contains(&home_log) {
        candidates.push(home_log);
    }

    // Fallback: ./.scribe/logs/scribe.log (useful in constrained environments)
    candidates.push(PathBuf::from(".scribe").join("logs").join("scribe.log"));

    candidates
}

/// Tab completion for slash commands.
#[derive(Debug)]
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new(commands: Vec<&'static str>) -> Self {
        Self { commands }
    }

    fn complete_token(&self, token: &str) -> Vec<String> {
        if !token.starts_with('/') {
            return Vec::new();
        }
        let token = token.to_ascii_lowercase();
        self.commands
            .iter()
            .filter(|candidate| candidate.starts_with(&token))
            .map(|candidate| (*candidate).to_string())
            .collect()
    }
}

impl Helper for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Highlighter for CommandCompleter {}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &ReadlineContext<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pos = pos.min(line.len());
        // Only the command word itself completes.
        if line[..pos].contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let matches = self
            .complete_token(&line[..pos])
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((0, matches))
    }
}

/// [`Console`] backed by rustyline for input and crossterm for styling.
struct TerminalConsole {
    editor: Editor<CommandCompleter, DefaultHistory>,
}

impl TerminalConsole {
    fn new() -> Result<Self> {
        let config = ReadlineConfig::builder().auto_add_history(false).build();
        let mut editor = Editor::<CommandCompleter, DefaultHistory>::with_config(config)
            .context("failed to initialize line editor")?;
        editor.set_helper(Some(CommandCompleter::new(command_names())));
        Ok(Self { editor })
    }

    /// Main prompt. Non-empty lines go into history.
    fn read_command(&mut self, admin_mode: bool) -> Option<String> {
        let marker = if admin_mode { "✓" } else { "✗" };
        let line = self.prompt(&format!("You {marker} > "))?;
        if !line.trim().is_empty() {
            let _ = self.editor.add_history_entry(line.as_str());
        }
        Some(line)
    }
}

impl Console for TerminalConsole {
    fn notice(&mut self, text: &str) {
        println!("{}", text.yellow());
    }

    fn error(&mut self, text: &str) {
        println!("{} {}", "Error:".red().bold(), text.red());
    }

    fn agent(&mut self, name: &str, text: &str) {
        println!("{}", format!("{name}:").green().bold());
        for line in text.lines() {
            println!("  {line}");
        }
    }

    fn raw(&mut self, text: &str) {
        println!("{text}");
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => Some(line),
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => None,
            Err(e) => {
                tracing::warn!("Failed to read input: {e}");
                None
            }
        }
    }

    fn clear(&mut self) {
        let mut out = stdout();
        if execute!(out, Clear(ClearType::All), MoveTo(0, 0)).is_err() {
            return;
        }
        let _ = out.flush();
    }
}

fn run_repl(session: &mut Session, console: &mut TerminalConsole) {
    while let Some(line) = console.read_command(session.admin_mode()) {
        if session.handle_line(&line, console) == Flow::Quit {
            break;
        }
    }
}

fn run() -> Result<()> {
    let config = AppConfig::load()
        .context("failed to load configuration")?
        .unwrap_or_default()
        .resolve();
    init_tracing(&config.log_file);
    tracing::info!(code_folder = %config.code_folder.display(), "Starting Scribe");

    let mut console = TerminalConsole::new()?;
    let mut session = start_session(&config, &mut console)?;

    run_repl(&mut session, &mut console);

    console.notice("AI Coding Assistant session ended.");
    session.shutdown();
    tracing::info!("Session ended");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
