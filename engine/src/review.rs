//! Review-and-apply workflow for a pending proposal batch.
//!
//! Review is a small state machine per item:
//!
//! ```text
//!              ┌─ admin && new && !apply-all ─▶ CreationGate ─ n ─▶ Denied
//!              │                                     │ s ─▶ Denied + SkipAll latch
//! Reviewing(i) ┤                                     ▼ y
//!              └────────────────────────────────▶ Preview ─ identical ─▶ Skipped(NoChange)
//!                                                    │
//!                           apply-all latch ◀─ a ─ Decide ─ y ─▶ Confirmed
//!                           skip-all latch  ◀─ s ─┘  │ n / EOF ─▶ Skipped
//!                                                    └ d / ? ─▶ Decide
//! ```
//!
//! Once every item is decided the review ends in `NothingConfirmed` or hands
//! the confirmed items to [`apply_confirmed`].

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scribe_tools::LaunchOutcome;
use scribe_types::{ApplyAction, ChangeProposal, ProposalBatch};
use scribe_utils::{char_len, indent, truncate_chars, unified_diff, write_preserving_mode};
use tracing::{error, info, warn};

use crate::console::Console;
use crate::session::{Session, display_name};

/// Preview length for the admin-mode creation gate.
const CREATION_SNIPPET_CHARS: usize = 300;
/// Preview length for a new file.
const NEW_FILE_PREVIEW_CHARS: usize = 2000;
/// Preview length when the original file vanished after parsing.
const VANISHED_PREVIEW_CHARS: usize = 1000;

const SEPARATOR: &str = "----------------------------------------";

const CHOICE_HELP: &str = " y: yes (default)\n \
     n: no\n \
     d: display full proposed content for this file\n \
     a: apply this change AND all subsequent changes automatically\n \
     s: skip this change AND all subsequent changes automatically\n \
     ?: this help message";

/// Answer at the per-item prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewChoice {
    Apply,
    Skip,
    ShowFull,
    ApplyAll,
    SkipAll,
    Help,
    Invalid,
}

impl ReviewChoice {
    /// Empty input takes the default (`y`).
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "" | "y" | "yes" => ReviewChoice::Apply,
            "n" | "no" => ReviewChoice::Skip,
            "d" => ReviewChoice::ShowFull,
            "a" => ReviewChoice::ApplyAll,
            "s" => ReviewChoice::SkipAll,
            "?" => ReviewChoice::Help,
            _ => ReviewChoice::Invalid,
        }
    }
}

/// Batch-wide decision latched by `a` or `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewLatch {
    #[default]
    Open,
    ApplyAll,
    SkipAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    User,
    /// Proposed content matches the file on disk.
    NoChange,
    /// Skipped by an earlier `s`.
    SkipAll,
    EndOfInput,
    /// The file on disk could not be read for a diff.
    Unreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Confirmed,
    Skipped(SkipReason),
    /// New-file creation refused at the admin-mode gate.
    Denied,
}

/// Per-item transition out of `Reviewing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Confirm,
    Skip(SkipReason),
    Deny,
    ApplyAllFromHere,
    SkipAllFromHere,
    DenyAndSkipAll,
}

#[derive(Debug, Default)]
pub struct ReviewReport {
    /// Confirmed proposals, in target order.
    pub confirmed: Vec<ChangeProposal>,
    /// Every reviewed target with its outcome, in review order.
    pub outcomes: Vec<(PathBuf, ItemOutcome)>,
}

impl ReviewReport {
    #[must_use]
    pub fn is_nothing_confirmed(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn denied(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == ItemOutcome::Denied)
            .map(|(p, _)| p.as_path())
    }

    pub fn not_confirmed(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o != ItemOutcome::Confirmed)
            .map(|(p, _)| p.as_path())
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    pub written: Vec<(PathBuf, ApplyAction)>,
    pub failed: Vec<(PathBuf, String)>,
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).map_or_else(
        |_| path.display().to_string(),
        |rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        },
    )
}

fn show_preview(console: &mut dyn Console, content: &str, limit: usize) {
    console.raw(&indent(truncate_chars(content, limit), "  "));
    let total = char_len(content);
    if total > limit {
        console.raw(&format!("  ... (content truncated - {total} chars total)"));
    }
}

/// Walk `batch` in target order, collecting a decision for each item.
///
/// End of input at any prompt, or an original that cannot be read, skips that item only.
pub fn review_batch(
    batch: ProposalBatch,
    root: &Path,
    admin_mode: bool,
    console: &mut dyn Console,
) -> ReviewReport {
    let mut report = ReviewReport::default();
    let mut latch = ReviewLatch::Open;

    for (key, mut proposal) in batch.into_review_order() {
        let target = proposal.target_path.clone();
        if latch == ReviewLatch::SkipAll {
            info!(%key, "Auto-skipping change after skip-all");
            report
                .outcomes
                .push((target, ItemOutcome::Skipped(SkipReason::SkipAll)));
            continue;
        }

        let transition = review_item(&mut proposal, root, admin_mode, latch, console);
        let outcome = match transition {
            Transition::Confirm => ItemOutcome::Confirmed,
            Transition::Skip(reason) => ItemOutcome::Skipped(reason),
            Transition::Deny => ItemOutcome::Denied,
            Transition::ApplyAllFromHere => {
                latch = ReviewLatch::ApplyAll;
                console.notice("Marked this and all subsequent changes for application.");
                ItemOutcome::Confirmed
            }
            Transition::SkipAllFromHere => {
                latch = ReviewLatch::SkipAll;
                console.notice("Marked this and all subsequent changes to be skipped.");
                ItemOutcome::Skipped(SkipReason::User)
            }
            Transition::DenyAndSkipAll => {
                latch = ReviewLatch::SkipAll;
                ItemOutcome::Denied
            }
        };
        info!(%key, ?outcome, "Reviewed change");
        if outcome == ItemOutcome::Confirmed {
            report.confirmed.push(proposal);
        }
        report.outcomes.push((target, outcome));
    }

    report
}

fn review_item(
    proposal: &mut ChangeProposal,
    root: &Path,
    admin_mode: bool,
    latch: ReviewLatch,
    console: &mut dyn Console,
) -> Transition {
    let rel = relative(root, &proposal.target_path);
    let apply_all = latch == ReviewLatch::ApplyAll;

    if proposal.is_new && admin_mode && !apply_all {
        console.raw(SEPARATOR);
        console.notice(&format!("AI proposes to CREATE a NEW file: {rel}"));
        console.notice(&format!(
            "(Original identifier: '{}')",
            proposal.source_identifier
        ));
        console.raw("+ Proposed content snippet:");
        show_preview(console, &proposal.content, CREATION_SNIPPET_CHARS);

        let Some(answer) =
            console.prompt(&format!("Allow creation of this new file '{rel}'? (y/n/s) [y]: "))
        else {
            console.error("Confirmation aborted (end of input). Skipping this change.");
            return Transition::Skip(SkipReason::EndOfInput);
        };
        match answer.trim().to_ascii_lowercase().as_str() {
            "n" => {
                console.notice(&format!("Creation of new file '{rel}' DENIED by user."));
                return Transition::Deny;
            }
            "s" => {
                console.notice(&format!(
                    "Skipping creation of '{rel}' and all subsequent proposals as per user request."
                ));
                return Transition::DenyAndSkipAll;
            }
            "y" | "" => {}
            _ => console.error(
                "Invalid input. \
                 Assuming 'yes' to review this new file for application.",
            ),
        }
    }

    console.raw(SEPARATOR);
    if proposal.is_new {
        console.notice(&format!(
            "Proposed NEW file: {rel} (from identifier: '{}')",
            proposal.source_identifier
        ));
        console.raw("+ Proposed content:");
        show_preview(console, &proposal.content, NEW_FILE_PREVIEW_CHARS);
    } else {
        console.notice(&format!(
            "Proposed changes for EXISTING file: {rel} (from identifier: '{}')",
            proposal.source_identifier
        ));
        match fs::read(&proposal.target_path) {
            Ok(bytes) => {
                let current = String::from_utf8_lossy(&bytes);
                let Some(diff) = unified_diff(&rel, &current, &proposal.content) else {
                    console.notice(&format!(
                        "No textual changes for '{rel}'. Skipping."
                    ));
                    return Transition::Skip(SkipReason::NoChange);
                };
                console.raw(diff.trim_end());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %proposal.target_path.display(), "Original file vanished since parsing");
                console.error(&format!(
                    "Original file '{rel}' not found (it may have been deleted or renamed). \
                     Treating this as a new file proposal."
                ));
                console.raw(&format!("+ Proposed full content for {rel}:"));
                show_preview(console, &proposal.content, VANISHED_PREVIEW_CHARS);
                proposal.is_new = true;
            }
            Err(e) => {
                warn!(path = %proposal.target_path.display(), "Failed to read original file: {e}");
                console.error(&format!(
                    "Could not read original file '{rel}': {e}. Skipping this change."
                ));
                return Transition::Skip(SkipReason::Unreadable);
            }
        }
    }

    if apply_all {
        console.notice(&format!(
            "Auto-confirming changes for '{rel}' due to 'apply all'."
        ));
        return Transition::Confirm;
    }

    console.raw(SEPARATOR);
    let question = format!("Apply changes to '{rel}'? (y/n/d/a/s/?) [y]: ");
    loop {
        let Some(answer) = console.prompt(&question) else {
            console.error("Confirmation aborted (end of input). Skipping this change.");
            return Transition::Skip(SkipReason::EndOfInput);
        };
        match ReviewChoice::parse(&answer) {
            ReviewChoice::Apply => return Transition::Confirm,
            ReviewChoice::Skip => {
                info!(path = %proposal.target_path.display(), "User skipped change");
                return Transition::Skip(SkipReason::User);
            }
            ReviewChoice::ApplyAll => return Transition::ApplyAllFromHere,
            ReviewChoice::SkipAll => return Transition::SkipAllFromHere,
            ReviewChoice::ShowFull => {
                console.raw(&format!(
                    "+ Proposed full content for {rel}:\n{}\n",
                    indent(&proposal.content, "  ")
                ));
            }
            ReviewChoice::Help => console.raw(CHOICE_HELP),
            ReviewChoice::Invalid => {
                console.raw("Invalid input. Please enter y, n, d, a, s, or ?.");
            }
        }
    }
}

/// Write every confirmed proposal in target order.
///
/// Existence is checked again at write time to classify the action. A failed
/// write is recorded and the rest continue.
pub fn apply_confirmed(
    confirmed: Vec<ChangeProposal>,
    root: &Path,
    console: &mut dyn Console,
) -> ApplyReport {
    let mut confirmed = confirmed;
    confirmed.sort_by(|a, b| a.target_path.cmp(&b.target_path));
    let mut report = ApplyReport::default();

    for proposal in confirmed {
        let rel = relative(root, &proposal.target_path);
        match write_proposal(&proposal) {
            Ok(action) => {
                info!(path = %proposal.target_path.display(), %action, "Applied change");
                console.notice(&format!("{action} '{rel}'."));
                report.written.push((proposal.target_path, action));
            }
            Err(e) => {
                error!(path = %proposal.target_path.display(), "Failed to write file: {e}");
                console.error(&format!("Failed to write file {rel}: {e}"));
                report.failed.push((proposal.target_path, e.to_string()));
            }
        }
    }
    report
}

fn write_proposal(proposal: &ChangeProposal) -> io::Result<ApplyAction> {
    if let Some(parent) = proposal.target_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let existed = proposal.target_path.exists();
    write_preserving_mode(&proposal.target_path, proposal.content.as_bytes())?;
    Ok(ApplyAction::from_existed(existed))
}

fn is_python_script(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
}

impl Session {
    /// Run the full review-and-apply workflow over the pending batch.
    ///
    /// The batch is consumed whatever happens.
    pub(crate) fn apply_pending(&mut self, console: &mut dyn Console) {
        let Some(batch) = self.pending.take() else {
            console.notice("No changes available to apply.");
            return;
        };
        let admin_mode = self.admin_mode();
        let root = self.index.root().to_path_buf();

        console.notice("\n--- Review Proposed Code Changes ---");
        let review = review_batch(batch, &root, admin_mode, console);

        if review.is_nothing_confirmed() {
            console.notice("No changes were confirmed for application.");
            let denied: Vec<String> = review.denied().map(|p| relative(&root, p)).collect();
            if !denied.is_empty() {
                console.notice(&format!(
                    "New file creations denied for: {}",
                    denied.join(", ")
                ));
            }
            return;
        }

        let not_confirmed: Vec<PathBuf> = review.not_confirmed().map(Path::to_path_buf).collect();
        console.notice("\n--- Applying Confirmed Changes ---");
        let applied = apply_confirmed(review.confirmed, &root, console);

        for (path, action) in &applied.written {
            let rel = relative(&root, path);
            if admin_mode && is_python_script(path) {
                console.notice(&format!(
                    "Admin Mode ON: \
                     Automatically attempting to execute {} Python script: '{rel}'...",
                    action.as_str().to_ascii_lowercase()
                ));
                self.launch_script(path, console);
            }
            if self.pinned.insert(path.clone()) {
                info!(path = %rel, "Auto-pinned written file");
                console.notice(&format!("Note: '{rel}' is now pinned."));
            }
        }

        let written: BTreeSet<&Path> = applied.written.iter().map(|(p, _)| p.as_path()).collect();
        if !written.is_empty() {
            let names: Vec<String> = written.iter().map(|p| relative(&root, p)).collect();
            console.notice(&format!(
                "\nChanges applied successfully to: {}",
                names.join(", ")
            ));
            if admin_mode && let Some(command) = self.settings.test_command().map(str::to_string) {
                console.notice(
                    "Admin mode is ON and a test command is configured. Running tests...",
                );
                self.run_test_command(&command, &[], console);
            }
        }

        let unapplied: BTreeSet<String> = not_confirmed
            .iter()
            .map(PathBuf::as_path)
            .chain(applied.failed.iter().map(|(p, _)| p.as_path()))
            .filter(|p| !written.contains(p))
            .map(|p| relative(&root, p))
            .collect();
        if !unapplied.is_empty() {
            console.notice(&format!(
                "Some changes were SKIPPED, DENIED, or FAILED for: {}",
                unapplied.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }

        if !written.is_empty() {
            console.notice("Re-indexing project due to file changes...");
            self.reindex(console);
        }
    }

    fn launch_script(&mut self, path: &Path, console: &mut dyn Console) {
        let name = display_name(path);
        match self.launcher.launch(path, self.admin_mode()) {
            Ok(LaunchOutcome::Launched { terminal }) => {
                console.notice(&format!("Launched '{name}' with {terminal}."));
            }
            Ok(LaunchOutcome::AdminDisabled) => {
                console.error("Admin mode is not enabled. Automatic script execution aborted.");
            }
            Ok(LaunchOutcome::NotAScript) => {
                console.notice(&format!(
                    "File '{name}' is not a Python script. Automatic execution skipped."
                ));
            }
            Err(e) => {
                warn!(path = %path.display(), "Script launch failed: {e}");
                console.error(&format!(
                    "Failed to execute script '{name}' in a new terminal: {e}"
                ));
            }
        }
    }
}
