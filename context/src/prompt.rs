//! Prompt assembly: preamble, project tree, pinned file contents, user request.

use std::path::Path;

use scribe_types::ContentPart;

use crate::budget::BudgetReport;

pub const NOTHING_PINNED: &str =
    "\nNo specific file contents are currently pinned. Use '/add <path>' to pin files for focus.";

pub const NOTHING_INCLUDED: &str = "\nPinned file contents were omitted because the content limit \
     left no room for them. Use '/drop <path>' to unpin files you no longer need.";

/// Default instruction for screen-capture analysis.
pub const DEFAULT_CAPTURE_PROMPT: &str =
    "Analyze this screenshot, focusing on any visible code, UI elements, or error messages.";

/// Builds the ordered content parts sent to the model.
#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler<'a> {
    root: &'a Path,
    admin_mode: bool,
}

impl<'a> PromptAssembler<'a> {
    #[must_use]
    pub fn new(root: &'a Path, admin_mode: bool) -> Self {
        Self { root, admin_mode }
    }

    fn root_name(&self) -> String {
        self.root.file_name().map_or_else(
            || self.root.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }

    /// Role instructions, including the `# FILEPATH:` edit format.
    #[must_use]
    pub fn preamble(&self) -> String {
        let admin_status = if self.admin_mode {
            "ENABLED (AI can propose file system changes and run commands if confirmed by user)"
        } else {
            "DISABLED (AI file system changes and command execution are off)"
        };
        format!(
            "You are an AI assistant specialized in code generation, analysis, and modification \
             for the project located at '{root}'.\n\
             Admin Mode: {admin_status}.\n\
             When proposing changes to existing files or suggesting new files, use the following \
             format precisely for each file:\n\
             # FILEPATH: path/relative/to/project_root/filename.ext\n\
             ```optional_language_marker\n\
             (full content of the file or code block)\n\
             ```\n\
             Ensure filepaths are relative to the project root: '{name}/'.",
            root = self.root.display(),
            name = self.root_name(),
        )
    }

    #[must_use]
    pub fn tree_block(&self, tree_text: &str) -> String {
        let name = self.root_name();
        format!(
            "\n\n--- Project Codebase Structure ({name}/) ---\n{tree_text}\n--- End Project Codebase Structure ---"
        )
    }

    #[must_use]
    pub fn files_block(report: &BudgetReport) -> String {
        if report.files.is_empty() {
            let notice = if report.pinned == 0 {
                NOTHING_PINNED
            } else {
                NOTHING_INCLUDED
            };
            return notice.to_string();
        }
        let mut blocks = Vec::with_capacity(report.files.len() + 1);
        blocks.push(format!(
            "\n\nThe following file contents are provided ({} files, total {} chars):",
            report.files.len(),
            report.total_chars
        ));
        for file in &report.files {
            blocks.push(format!(
                "\n`{}`\n```\n{}\n```",
                file.relative_path, file.content
            ));
        }
        blocks.join("\n")
    }

    #[must_use]
    pub fn user_block(message: &str) -> String {
        format!("\n\n---\n\nUser request:\n{message}")
    }

    /// Parts for an ordinary message turn.
    #[must_use]
    pub fn assemble(&self, tree_text: &str, report: &BudgetReport, message: &str) -> Vec<ContentPart> {
        vec![
            ContentPart::Text(self.preamble()),
            ContentPart::Text(self.tree_block(tree_text)),
            ContentPart::Text(Self::files_block(report)),
            ContentPart::Text(Self::user_block(message)),
        ]
    }

    /// Parts for a screen-capture turn: the instruction followed by the image.
    #[must_use]
    pub fn capture_parts(instruction: Option<&str>, image: ContentPart) -> Vec<ContentPart> {
        let text = instruction
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CAPTURE_PROMPT);
        vec![ContentPart::text(text), image]
    }
}
