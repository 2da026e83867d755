//! File-change proposals extracted from a model reply.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One proposed file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeProposal {
    /// Path exactly as the model wrote it (after quote trimming).
    pub source_identifier: String,
    /// Resolved absolute target, always inside the project root.
    pub target_path: PathBuf,
    /// Normalized content: `\n` line endings, no surrounding blank lines.
    pub content: String,
    /// Whether the target was absent when the reply was parsed.
    pub is_new: bool,
}

/// Proposals from one model reply, keyed by `identifier_ordinal`.
///
/// Insertion order is preserved; review order is by target path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalBatch {
    entries: Vec<(String, ChangeProposal)>,
}

impl ProposalBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for the `ordinal`-th marker of a reply.
    #[must_use]
    pub fn key_for(identifier: &str, ordinal: usize) -> String {
        format!("{identifier}_{ordinal}")
    }

    pub fn insert(&mut self, key: String, proposal: ChangeProposal) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = proposal;
        } else {
            self.entries.push((key, proposal));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ChangeProposal> {
        self.entries
            .iter()
            .find_map(|(k, proposal)| (k == key).then_some(proposal))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChangeProposal)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Consume the batch, yielding proposals sorted by target path.
    ///
    /// The sort is stable, so duplicates of one target keep reply order.
    #[must_use]
    pub fn into_review_order(self) -> Vec<(String, ChangeProposal)> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| a.1.target_path.cmp(&b.1.target_path));
        entries
    }

    /// Number of distinct target files.
    #[must_use]
    pub fn unique_targets(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, p)| p.target_path.as_path())
            .collect::<BTreeSet<&Path>>()
            .len()
    }

    /// `(new, modified)` proposal counts.
    #[must_use]
    pub fn new_and_modified_counts(&self) -> (usize, usize) {
        let new = self.entries.iter().filter(|(_, p)| p.is_new).count();
        (new, self.entries.len() - new)
    }
}

/// What a successful write did to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Modified,
}

impl ApplyAction {
    #[must_use]
    pub const fn from_existed(existed: bool) -> Self {
        if existed {
            ApplyAction::Modified
        } else {
            ApplyAction::Created
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ApplyAction::Created => "Created",
            ApplyAction::Modified => "Modified",
        }
    }
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
