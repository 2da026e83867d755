//! The explicit session context passed through every operation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use scribe_config::SettingsStore;
use scribe_context::{ContextLimits, ProjectIndex};
use scribe_providers::ChatBackend;
use scribe_tools::{
    CaptureSource, ProjectSandbox, ScriptLauncher, TestRunner, ToolError, full_command,
};
use scribe_types::{ProposalBatch, Settings};
use scribe_utils::indent;
use tracing::{error, info, warn};

use crate::console::Console;

/// Name replies are attributed to.
pub const AGENT_NAME: &str = "Scribe";

/// What the main loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// External collaborators the session drives.
pub struct Collaborators {
    pub chat: Box<dyn ChatBackend>,
    pub tests: Box<dyn TestRunner>,
    pub launcher: Box<dyn ScriptLauncher>,
    /// `None` when no capture utility is available on this platform.
    pub capture: Option<Box<dyn CaptureSource>>,
}

/// Absolute paths included in every prompt, kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedFiles {
    paths: BTreeSet<PathBuf>,
}

impl PinnedFiles {
    /// Returns `false` if `path` was already pinned.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.paths.remove(path)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Unpin everything, returning how many were pinned.
    pub fn clear(&mut self) -> usize {
        let count = self.paths.len();
        self.paths.clear();
        count
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.paths.iter().cloned().collect()
    }

    /// Drop pins that are no longer indexed, returning them.
    pub fn retain_indexed(&mut self, index: &ProjectIndex) -> Vec<PathBuf> {
        let stale: Vec<PathBuf> = self
            .paths
            .iter()
            .filter(|p| index.lookup_absolute(p).is_none())
            .cloned()
            .collect();
        for path in &stale {
            self.paths.remove(path);
        }
        stale
    }
}

pub struct Session {
    pub(crate) settings: Settings,
    store: SettingsStore,
    pub(crate) index: ProjectIndex,
    pub(crate) sandbox: ProjectSandbox,
    pub(crate) pinned: PinnedFiles,
    pub(crate) pending: Option<ProposalBatch>,
    pub(crate) limits: ContextLimits,
    pub(crate) chat: Box<dyn ChatBackend>,
    pub(crate) tests: Box<dyn TestRunner>,
    pub(crate) launcher: Box<dyn ScriptLauncher>,
    pub(crate) capture: Option<Box<dyn CaptureSource>>,
}

impl Session {
    /// Assemble a session around an already scanned index.
    pub fn new(
        index: ProjectIndex,
        store: SettingsStore,
        settings: Settings,
        limits: ContextLimits,
        collaborators: Collaborators,
    ) -> Self {
        let sandbox = ProjectSandbox::new(index.root());
        Self {
            settings,
            store,
            index,
            sandbox,
            pinned: PinnedFiles::default(),
            pending: None,
            limits,
            chat: collaborators.chat,
            tests: collaborators.tests,
            launcher: collaborators.launcher,
            capture: collaborators.capture,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn admin_mode(&self) -> bool {
        self.settings.admin_mode_enabled
    }

    #[must_use]
    pub fn index(&self) -> &ProjectIndex {
        &self.index
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.index.root()
    }

    #[must_use]
    pub fn pinned(&self) -> &PinnedFiles {
        &self.pinned
    }

    #[must_use]
    pub fn pending(&self) -> Option<&ProposalBatch> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn available_models(&self) -> Vec<String> {
        self.chat.available_models()
    }

    /// Route one line of user input.
    pub fn handle_line(&mut self, line: &str, console: &mut dyn Console) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        if line.starts_with('/') {
            self.run_command(line, console)
        } else {
            self.send_message(line, console);
            Flow::Continue
        }
    }

    /// Close the settings store.
    pub fn shutdown(self) {
        if let Err(e) = self.store.close() {
            error!("Failed to close settings store: {e:#}");
        } else {
            info!("Settings store closed");
        }
    }

    /// Apply `change` to a copy of the settings and persist it.
    ///
    /// The in-memory settings only change once the save succeeded.
    pub(crate) fn update_settings(
        &mut self,
        console: &mut dyn Console,
        change: impl FnOnce(&mut Settings),
    ) -> bool {
        let mut updated = self.settings.clone();
        change(&mut updated);
        match self.store.save(&updated) {
            Ok(()) => {
                self.settings = updated;
                true
            }
            Err(e) => {
                error!("Failed to save settings: {e:#}");
                console.error(&format!("Failed to save settings: {e:#}"));
                false
            }
        }
    }

    /// The selected model, falling back to the first available one.
    ///
    /// A fallback is persisted. `None` means no model is available at all.
    pub(crate) fn ensure_model(&mut self, console: &mut dyn Console) -> Option<String> {
        let current = self.settings.model_name.clone();
        if self.chat.is_available(&current) {
            return Some(current);
        }
        let Some(fallback) = self.chat.first_available() else {
            error!(model = %current, "No AI models available");
            console.error(
                "No AI models are currently available. Please check API key configuration and application logs.",
            );
            return None;
        };
        warn!(from = %current, to = %fallback, "Selected model unavailable; falling back");
        console.error(&format!(
            "Currently selected AI model '{current}' is unavailable. Switching to the first available model: '{fallback}'."
        ));
        let name = fallback.clone();
        self.update_settings(console, move |s| s.model_name = name);
        Some(fallback)
    }

    /// Rescan the project and drop pins that disappeared.
    pub(crate) fn reindex(&mut self, console: &mut dyn Console) {
        self.index.refresh();
        for path in self.pinned.retain_indexed(&self.index) {
            console.notice(&format!(
                "Pinned file '{}' no longer in index. Unpinning.",
                display_name(&path)
            ));
        }
    }

    /// Project-relative display form of `path`.
    pub(crate) fn display_path(&self, path: &Path) -> String {
        self.index
            .relative_key(path)
            .unwrap_or_else(|| path.display().to_string())
    }

    /// Run `command` with `args` in the project root and print the outcome.
    pub(crate) fn run_test_command(
        &mut self,
        command: &str,
        args: &[String],
        console: &mut dyn Console,
    ) {
        let root = self.index.root().to_path_buf();
        let line = full_command(command, args);
        console.notice(&format!(
            "\nRunning command: {line} (in directory: {})",
            root.display()
        ));

        match self.tests.run(command, args, &root) {
            Ok(output) => {
                let code = output
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                console.notice(&format!("--- Command Output (Exit Code: {code}) ---"));
                let stdout = output.stdout.trim();
                if !stdout.is_empty() {
                    console.raw(&format!("Stdout:\n{}", indent(stdout, "  ")));
                }
                let stderr = output.stderr.trim();
                if !stderr.is_empty() {
                    console.error(&format!("Stderr:\n{}", indent(stderr, "  ")));
                }
                if output.success() {
                    console.notice("--- Command FINISHED SUCCESSFULLY ---");
                } else {
                    console.error(&format!("--- Command FAILED (exit code {code}) ---"));
                }
            }
            Err(e @ ToolError::Timeout { .. }) => {
                warn!(command = %line, "Test command timed out");
                console.error(&format!("Test command timed out: {e}"));
            }
            Err(e) => {
                error!(command = %line, "Test command could not run: {e}");
                console.error(&format!("Failed to run test command '{line}': {e}"));
            }
        }
    }
}

/// Final component of `path`, for messages.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{FakeChat, Harness, ScriptedConsole};

    #[test]
    fn pinned_files_drop_entries_missing_from_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "a").expect("write");
        let index = ProjectIndex::open(dir.path(), Default::default());

        let mut pinned = PinnedFiles::default();
        assert!(pinned.insert(index.root().join("a.txt")));
        assert!(!pinned.insert(index.root().join("a.txt")));
        pinned.insert(index.root().join("gone.txt"));

        let stale = pinned.retain_indexed(&index);
        assert_eq!(stale, vec![index.root().join("gone.txt")]);
        assert_eq!(pinned.len(), 1);
    }

    #[test]
    fn unavailable_model_falls_back_and_persists() {
        let mut harness = Harness::new(FakeChat::new(&["mistral", "codestral"]));
        let mut console = ScriptedConsole::default();

        let model = harness.session.ensure_model(&mut console);
        assert_eq!(model.as_deref(), Some("mistral"));
        assert_eq!(harness.session.settings().model_name, "mistral");
        assert!(console.errors().iter().any(|e| e.contains("'gemini' is unavailable")));
        assert_eq!(harness.stored_settings().model_name, "mistral");
    }

    #[test]
    fn no_model_at_all_is_reported() {
        let mut harness = Harness::new(FakeChat::new(&[]));
        let mut console = ScriptedConsole::default();

        assert!(harness.session.ensure_model(&mut console).is_none());
        assert!(console.errors().iter().any(|e| e.contains("No AI models")));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut harness = Harness::new(FakeChat::new(&["gemini"]));
        let mut console = ScriptedConsole::default();
        assert_eq!(harness.session.handle_line("   ", &mut console), Flow::Continue);
        assert!(console.output().is_empty());
        assert_eq!(harness.chat_calls(), 0);
    }
}
