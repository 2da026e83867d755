//! Core engine for Scribe - session state and orchestration.
//!
//! This crate owns the single-threaded interaction flow without any terminal
//! dependencies. All user-facing output goes through [`Console`].
//!
//! ```text
//! line ─▶ Session::handle_line ─┬─▶ slash command
//!                               └─▶ message turn ─▶ ChatBackend ─▶ ChangeParser ─▶ pending batch
//! /apply ─▶ review (FSM) ─▶ apply writes ─▶ launch / pin ─▶ tests ─▶ reindex
//! ```

mod commands;
mod console;
mod help;
mod init;
mod review;
mod session;
mod summarizer;
mod turn;

#[cfg(test)]
mod test_support;

pub use commands::{COMMAND_SPECS, CommandSpec, command_names};
pub use console::Console;
pub use help::{HELP_PAGE_SIZE, help_pages};
pub use init::{build_registry, context_limits, start_session};
pub use review::{
    ApplyReport, ItemOutcome, ReviewChoice, ReviewLatch, ReviewReport, SkipReason,
    apply_confirmed, review_batch,
};
pub use session::{AGENT_NAME, Collaborators, Flow, PinnedFiles, Session};
pub use summarizer::ChatSummarizer;
