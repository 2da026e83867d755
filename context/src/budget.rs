//! Character-budgeted file content for prompts.
//!
//! Two caps apply independently: a per-file cap (truncation, or summarization
//! once content crosses the summarization trigger) and a total cap shared by
//! every pinned file in order.

use std::fmt;
use std::path::{Path, PathBuf};

use scribe_utils::{char_len, truncate_chars};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::index::{DEFAULT_MAX_FILE_BYTES, ProjectIndex};

/// Character and byte limits for prompt content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub per_file_chars: usize,
    pub total_chars: usize,
    /// Maximum file characters sent to the summarizer.
    pub summarize_input_chars: usize,
    /// Content longer than this is summarized instead of truncated.
    pub summarize_trigger_chars: usize,
    pub max_file_bytes: u64,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            per_file_chars: 10_000,
            total_chars: 50_000,
            summarize_input_chars: 15_000,
            summarize_trigger_chars: 15_000,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("No AI models available.")]
    Unavailable,
    #[error("{0}")]
    Failed(String),
}

/// External collaborator that condenses oversized file content.
pub trait Summarizer {
    fn summarize(&mut self, prompt: &str) -> Result<String, SummarizeError>;
}

/// Summarizer used when no model backend is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSummarizer;

impl Summarizer for NoSummarizer {
    fn summarize(&mut self, _prompt: &str) -> Result<String, SummarizeError> {
        Err(SummarizeError::Unavailable)
    }
}

/// Prompt asking a model to summarize one file.
#[must_use]
pub fn summarization_prompt(relative_path: &str, content: &str, limits: &ContextLimits) -> String {
    let head = truncate_chars(content, limits.summarize_input_chars);
    let mut prompt = format!(
        "Summarize the following content from the file '{relative_path}'. \
         Focus on the core logic, main functionalities, and purpose of the code or text. \
         The summary should be concise and capture the essence of the file for an AI assistant \
         to understand its role in a larger project. \
         Keep the summary under {} characters if possible.\n\n\
         Full content of '{relative_path}':\n```\n{head}\n```",
        limits.per_file_chars / 2
    );
    if head.len() < content.len() {
        prompt.push_str("\n(Note: Original content was truncated for this summarization prompt)");
    }
    prompt
}

/// How a file's content was fitted into the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    Full,
    Truncated,
    Summarized,
    /// Cut to whatever remained of the total cap.
    CutToFit,
}

impl Treatment {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Treatment::Full => "",
            Treatment::Truncated => " - truncated",
            Treatment::Summarized => " - summarized",
            Treatment::CutToFit => " - heavily truncated due to total limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetedFile {
    pub relative_path: String,
    pub content: String,
    pub treatment: Treatment,
}

impl BudgetedFile {
    /// One-line description for the log, e.g. `src/app.py (pinned, 120 chars) - truncated`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} (pinned, {} chars){}",
            self.relative_path,
            char_len(&self.content),
            self.treatment.label()
        )
    }
}

/// User-visible events raised while budgeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetNotice {
    StalePin { name: String },
    Summarizing { relative_path: String, chars: usize },
    Summarized {
        relative_path: String,
        original_chars: usize,
        summary_chars: usize,
    },
    SummaryFailed { relative_path: String, reason: String },
    TotalCapExhausted { name: String },
    TotalCapFilled,
    OutsideRoot { name: String },
}

impl BudgetNotice {
    /// Whether this should be shown as an error rather than a notice.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            BudgetNotice::StalePin { .. }
                | BudgetNotice::SummaryFailed { .. }
                | BudgetNotice::OutsideRoot { .. }
        )
    }
}

impl fmt::Display for BudgetNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetNotice::StalePin { name } => {
                write!(f, "Pinned file '{name}' no longer in index. Unpinning.")
            }
            BudgetNotice::Summarizing {
                relative_path,
                chars,
            } => write!(
                f,
                "Content of '{relative_path}' ({chars} chars) is large. Attempting summarization..."
            ),
            BudgetNotice::Summarized {
                relative_path,
                original_chars,
                summary_chars,
            } => write!(
                f,
                "Summarized '{relative_path}'. Original: {original_chars} chars, Summary: {summary_chars} chars."
            ),
            BudgetNotice::SummaryFailed {
                relative_path,
                reason,
            } => write!(
                f,
                "Failed to summarize '{relative_path}'. Using truncated content. AI Error: {reason}"
            ),
            BudgetNotice::TotalCapExhausted { name } => write!(
                f,
                "Warning: Max total file content limit reached. Cannot include content from '{name}' or subsequent files."
            ),
            BudgetNotice::TotalCapFilled => f.write_str(
                "Warning: Max total file content limit reached. Further pinned files may be skipped or truncated.",
            ),
            BudgetNotice::OutsideRoot { name } => {
                write!(f, "Error accessing pinned file '{name}'.")
            }
        }
    }
}

/// Result of one budgeting pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetReport {
    /// How many paths were pinned going in, included or not.
    pub pinned: usize,
    pub files: Vec<BudgetedFile>,
    pub total_chars: usize,
    /// Pinned paths no longer in the index; the caller unpins them.
    pub stale: Vec<PathBuf>,
    pub notices: Vec<BudgetNotice>,
}

impl BudgetReport {
    fn include(&mut self, file: BudgetedFile) {
        info!("Including {}", file.describe());
        self.files.push(file);
    }
}

/// Fits pinned file contents under the configured caps.
pub struct ContentBudgeter<'a> {
    index: &'a ProjectIndex,
    limits: ContextLimits,
}

impl<'a> ContentBudgeter<'a> {
    #[must_use]
    pub fn new(index: &'a ProjectIndex, limits: ContextLimits) -> Self {
        Self { index, limits }
    }

    /// Budget `pinned` in order.
    ///
    /// Never fails: per-file problems become notices and the file is skipped.
    pub fn budget(&self, pinned: &[PathBuf], summarizer: &mut dyn Summarizer) -> BudgetReport {
        let mut report = BudgetReport {
            pinned: pinned.len(),
            ..BudgetReport::default()
        };

        for path in pinned {
            let name = display_name(path);
            let Some(relative_path) = self.index.relative_key(path) else {
                warn!(path = %path.display(), "Pinned file is outside the project root");
                report.notices.push(BudgetNotice::OutsideRoot { name });
                continue;
            };
            let Some(original) = self
                .index
                .get_content(&relative_path, self.limits.max_file_bytes)
            else {
                warn!(path = %path.display(), "Pinned file not in index; unpinning");
                report.stale.push(path.clone());
                report.notices.push(BudgetNotice::StalePin { name });
                continue;
            };

            if original.is_empty() {
                debug!(path = %relative_path, "Pinned file is empty");
                report.include(BudgetedFile {
                    relative_path,
                    content: String::new(),
                    treatment: Treatment::Full,
                });
                continue;
            }

            let (mut content, mut treatment) =
                self.fit_file(&relative_path, &original, summarizer, &mut report.notices);

            let length = char_len(&content);
            if report.total_chars + length > self.limits.total_chars {
                let remaining = self.limits.total_chars.saturating_sub(report.total_chars);
                if remaining == 0 {
                    warn!(
                        path = %relative_path,
                        limit = self.limits.total_chars,
                        "Total content limit reached; skipping remaining pinned files"
                    );
                    report.notices.push(BudgetNotice::TotalCapExhausted { name });
                    break;
                }
                content = truncate_chars(&content, remaining).to_string();
                treatment = Treatment::CutToFit;
            }

            report.total_chars += char_len(&content);
            report.include(BudgetedFile {
                relative_path,
                content,
                treatment,
            });

            if report.total_chars >= self.limits.total_chars {
                info!(limit = self.limits.total_chars, "Total content limit filled");
                report.notices.push(BudgetNotice::TotalCapFilled);
                break;
            }
        }

        info!(
            files = report.files.len(),
            chars = report.total_chars,
            "Budgeted pinned file content"
        );
        report
    }

    fn fit_file(
        &self,
        relative_path: &str,
        original: &str,
        summarizer: &mut dyn Summarizer,
        notices: &mut Vec<BudgetNotice>,
    ) -> (String, Treatment) {
        let length = char_len(original);
        if length > self.limits.summarize_trigger_chars {
            notices.push(BudgetNotice::Summarizing {
                relative_path: relative_path.to_string(),
                chars: length,
            });
            let prompt = summarization_prompt(relative_path, original, &self.limits);
            match summarizer.summarize(&prompt) {
                Ok(summary) if !summary.is_empty() && !summary.starts_with("Error:") => {
                    notices.push(BudgetNotice::Summarized {
                        relative_path: relative_path.to_string(),
                        original_chars: length,
                        summary_chars: char_len(&summary),
                    });
                    return (
                        format!("[Summarized Content of {relative_path}]:\n{summary}"),
                        Treatment::Summarized,
                    );
                }
                Ok(summary) => {
                    warn!(path = %relative_path, "Summarization returned an error reply");
                    notices.push(BudgetNotice::SummaryFailed {
                        relative_path: relative_path.to_string(),
                        reason: summary,
                    });
                }
                Err(e) => {
                    warn!(path = %relative_path, "Summarization failed: {e}");
                    notices.push(BudgetNotice::SummaryFailed {
                        relative_path: relative_path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            return (
                truncate_chars(original, self.limits.per_file_chars).to_string(),
                Treatment::Truncated,
            );
        }
        if length > self.limits.per_file_chars {
            return (
                truncate_chars(original, self.limits.per_file_chars).to_string(),
                Treatment::Truncated,
            );
        }
        (original.to_string(), Treatment::Full)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
