//! Core domain types for Scribe.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod proposal;
mod settings;

pub use proposal::{ApplyAction, ChangeProposal, ProposalBatch};
pub use settings::{
    DEFAULT_MODEL_NAME, SettingKey, Settings, SettingsError, Temperature, parse_flag,
};

use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Project index entries
// ============================================================================

/// One indexed file.
///
/// `relative_path` is always forward-slash separated and relative to the
/// project root; it is the unique key in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
}

impl IndexEntry {
    /// Size in KiB, for display.
    #[must_use]
    pub fn size_kib(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }

    /// Final path component of the relative path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map_or(self.relative_path.as_str(), |(_, name)| name)
    }
}

// ============================================================================
// Model collaborator inputs
// ============================================================================

/// A single opaque part of a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Pre-encoded image payload (base64 without a data-URL prefix).
    Image {
        mime_type: String,
        data_base64: String,
    },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// What the request is for. Backends may route to different agents per hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelHint {
    Code,
    Conversation,
}

impl ModelHint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ModelHint::Code => "code",
            ModelHint::Conversation => "conversation",
        }
    }
}

impl fmt::Display for ModelHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
