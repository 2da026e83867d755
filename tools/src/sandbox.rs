//! Write-target resolution confined to the project root.
//!
//! Containment is decided component-wise on a lexically normalized path, then
//! re-checked against the canonical root so a symlinked directory inside the
//! project cannot redirect a write outside it.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::{DenialReason, ToolError};

/// How an identifier was mapped onto the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Relative,
    AbsoluteInside,
    /// Absolute path outside the root, re-rooted at the project-name component.
    Reinterpreted { remainder: String },
    /// Absolute path outside the root with no project-name component.
    BasenameFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub resolution: Resolution,
}

/// The project root that every write must stay inside.
#[derive(Debug, Clone)]
pub struct ProjectSandbox {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
}

impl ProjectSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = lexical_normalize(&root.into());
        let canonical_root = fs::canonicalize(&root).ok();
        Self {
            root,
            canonical_root,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn root_name(&self) -> Option<&OsStr> {
        self.root.file_name()
    }

    /// Map a model-written identifier onto an absolute path, without enforcing containment.
    #[must_use]
    pub fn interpret(&self, identifier: &str) -> ResolvedTarget {
        let candidate = Path::new(identifier);
        if !candidate.is_absolute() {
            return ResolvedTarget {
                path: lexical_normalize(&self.root.join(candidate)),
                resolution: Resolution::Relative,
            };
        }

        let normalized = lexical_normalize(candidate);
        if normalized.starts_with(&self.root) {
            return ResolvedTarget {
                path: normalized,
                resolution: Resolution::AbsoluteInside,
            };
        }

        if let Some(remainder) = self.remainder_after_root_name(candidate) {
            debug!(identifier, remainder = %remainder.display(), "Re-rooting absolute path at project name");
            return ResolvedTarget {
                path: lexical_normalize(&self.root.join(&remainder)),
                resolution: Resolution::Reinterpreted {
                    remainder: remainder.to_string_lossy().replace('\\', "/"),
                },
            };
        }

        let base = candidate.file_name().unwrap_or_default();
        warn!(identifier, "Absolute path outside project; using its file name");
        ResolvedTarget {
            path: self.root.join(base),
            resolution: Resolution::BasenameFallback,
        }
    }

    /// Components after the first one equal to the project directory's name.
    fn remainder_after_root_name(&self, candidate: &Path) -> Option<PathBuf> {
        let name = self.root_name()?;
        let mut components = candidate.components();
        components.find(|c| matches!(c, Component::Normal(part) if *part == name))?;
        let remainder: PathBuf = components.collect();
        (!remainder.as_os_str().is_empty()).then_some(remainder)
    }

    /// Resolve `identifier` and enforce containment.
    pub fn resolve(&self, identifier: &str) -> Result<ResolvedTarget, ToolError> {
        if identifier.chars().any(char::is_control) {
            return Err(ToolError::SandboxViolation(
                DenialReason::UnsafeCharacters {
                    attempted: identifier.to_string(),
                },
            ));
        }
        let target = self.interpret(identifier);
        self.ensure_contained(Path::new(identifier), &target.path)?;
        Ok(target)
    }

    /// Verify `resolved` is strictly below the root, lexically and after symlinks.
    pub fn ensure_contained(&self, attempted: &Path, resolved: &Path) -> Result<(), ToolError> {
        let lexical = lexical_normalize(resolved);
        if !lexical.starts_with(&self.root) || lexical == self.root {
            return Err(ToolError::SandboxViolation(
                DenialReason::PathOutsideSandbox {
                    attempted: attempted.to_path_buf(),
                    resolved: lexical,
                },
            ));
        }
        let Some(canonical_root) = &self.canonical_root else {
            return Ok(());
        };
        let Some(canonical) = canonicalize_for_create(&lexical) else {
            return Ok(());
        };
        if canonical.starts_with(canonical_root) {
            Ok(())
        } else {
            Err(ToolError::SandboxViolation(DenialReason::SymlinkEscape {
                attempted: attempted.to_path_buf(),
                resolved: canonical,
            }))
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` at the filesystem root stays at the root.
#[must_use]
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and rejoin the missing tail.
fn canonicalize_for_create(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return fs::canonicalize(path).ok();
    }
    let mut missing: Vec<&OsStr> = Vec::new();
    let mut ancestor = Some(path);
    while let Some(current) = ancestor {
        if current.exists() {
            let mut result = fs::canonicalize(current).ok()?;
            for part in missing.into_iter().rev() {
                result.push(part);
            }
            return Some(result);
        }
        missing.push(current.file_name()?);
        ancestor = current.parent();
    }
    None
}
