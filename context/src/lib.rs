//! Context pipeline for Scribe.
//!
//! - [`ProjectIndex`]: ignore-filtered index and tree of the project directory
//! - [`ContentBudgeter`]: pinned file contents under per-file and total caps
//! - [`PromptAssembler`]: ordered content parts for the model
//!
//! ```text
//! ProjectIndex ──tree──────────────┐
//!      │                           ▼
//!      └─bytes─▶ ContentBudgeter ─▶ PromptAssembler ─▶ Vec<ContentPart>
//! ```

mod budget;
mod index;
mod prompt;

pub use budget::{
    BudgetNotice, BudgetReport, BudgetedFile, ContentBudgeter, ContextLimits, NoSummarizer,
    SummarizeError, Summarizer, Treatment, summarization_prompt,
};
pub use index::{
    DEFAULT_IGNORE_PATTERNS, DEFAULT_MAX_FILE_BYTES, IgnoreRules, IndexError, ProjectIndex,
};
pub use prompt::{DEFAULT_CAPTURE_PROMPT, NOTHING_INCLUDED, NOTHING_PINNED, PromptAssembler};
