//! Shared infrastructure utilities for Scribe.
//!
//! This crate provides cross-cutting utilities that multiple Scribe crates need
//! but that don't belong in the domain-pure `scribe-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file replacement (temp + rename)
//! - **`diff`**: Unified diff rendering, and no-op detection
//! - **`text`**: Char-boundary-safe truncation and indentation

pub mod atomic_write;
pub mod diff;
pub mod text;

pub use atomic_write::{PersistMode, write_preserving_mode};
pub use diff::{is_textually_identical, normalize_line_endings, unified_diff};
pub use text::{char_len, indent, truncate_chars};
