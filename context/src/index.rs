//! Project index: an ignore-filtered map of the files under a root directory.
//!
//! The index is rebuilt wholesale by [`ProjectIndex::refresh`]. A failed scan
//! never propagates; the index degrades to empty with an error placeholder in
//! place of the tree.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use scribe_types::IndexEntry;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Names pruned from every scan unless the caller supplies its own rules.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    "build",
    "dist",
    ".DS_Store",
    "*.pyc",
    "*.swp",
    "*.swo",
    "*.log",
    "*.tmp",
    "venv",
    ".venv",
    "env",
    ".env",
    "ENV",
    "*~",
    "*.bak",
    "*.o",
    "*.obj",
    "*.dll",
    "*.so",
    "*.dylib",
];

/// Hidden names that escape the leading-dot rule.
const HIDDEN_ALLOW_LIST: &[&str] = &[".env"];

/// Default cap for [`ProjectIndex::get_content`].
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

const TREE_NOT_GENERATED: &str = "[Project tree not yet generated]";
const TREE_ROOT_MISSING: &str = "[Error: Base project path not found or not a directory]";
const TREE_SCAN_FAILED: &str = "[Error generating project tree during scan]";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Project root is not a directory: {0}")]
    RootMissing(PathBuf),
    #[error("Failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Name-based ignore rules applied to every directory and file during a scan.
///
/// A name is ignored when it equals a literal pattern, matches a wildcard
/// pattern, or starts with `.` and is not on the hidden allow-list.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    exact: HashSet<String>,
    wildcards: GlobSet,
}

impl IgnoreRules {
    pub fn new<I, S>(patterns: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = HashSet::new();
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.contains('*') {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|source| IndexError::BadPattern {
                        pattern: pattern.to_string(),
                        source,
                    })?;
                builder.add(glob);
            } else {
                exact.insert(pattern.to_string());
            }
        }
        let wildcards = builder.build().map_err(|source| IndexError::BadPattern {
            pattern: "<set>".to_string(),
            source,
        })?;
        Ok(Self { exact, wildcards })
    }

    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        if self.exact.contains(name) {
            return true;
        }
        if name.starts_with('.') && !HIDDEN_ALLOW_LIST.contains(&name) {
            return true;
        }
        self.wildcards.is_match(name)
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        let exact = DEFAULT_IGNORE_PATTERNS
            .iter()
            .filter(|p| !p.contains('*'))
            .map(|p| (*p).to_string())
            .collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_IGNORE_PATTERNS.iter().filter(|p| p.contains('*')) {
            if let Ok(glob) = GlobBuilder::new(pattern).literal_separator(true).build() {
                builder.add(glob);
            }
        }
        let wildcards = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self { exact, wildcards }
    }
}

/// Live index of a project directory.
#[derive(Debug)]
pub struct ProjectIndex {
    root: PathBuf,
    rules: IgnoreRules,
    entries: BTreeMap<String, IndexEntry>,
    tree_text: String,
}

impl ProjectIndex {
    /// Create an index for `root` without scanning it.
    ///
    /// A missing root directory is created; failure to do so is logged and
    /// surfaces later as an empty index.
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        let root = absolutize(&root.into());
        if !root.is_dir() {
            warn!(path = %root.display(), "Project root is not a directory; creating it");
            if let Err(e) = fs::create_dir_all(&root) {
                warn!(path = %root.display(), "Failed to create project root: {e}");
            }
        }
        Self {
            root,
            rules,
            entries: BTreeMap::new(),
            tree_text: TREE_NOT_GENERATED.to_string(),
        }
    }

    /// Create an index for `root` and scan it immediately.
    pub fn open(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        let mut index = Self::new(root, rules);
        index.refresh();
        index
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final component of the root, used as the tree heading.
    #[must_use]
    pub fn root_name(&self) -> String {
        self.root
            .file_name()
            .map_or_else(|| self.root.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn tree_text(&self) -> &str {
        &self.tree_text
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, relative_path: &str) -> Option<&IndexEntry> {
        self.entries.get(&relative_path.replace('\\', "/"))
    }

    #[must_use]
    pub fn contains(&self, relative_path: &str) -> bool {
        self.get(relative_path).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Index key for an absolute path under the root.
    #[must_use]
    pub fn relative_key(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(key)
    }

    /// Entry for an absolute path, if it is indexed.
    #[must_use]
    pub fn lookup_absolute(&self, absolute: &Path) -> Option<&IndexEntry> {
        self.relative_key(absolute)
            .and_then(|key| self.entries.get(&key))
    }

    /// Indexed files directly inside `relative_dir` (`""` for the root).
    #[must_use]
    pub fn direct_children(&self, relative_dir: &str) -> Vec<&IndexEntry> {
        let prefix = match relative_dir.trim_matches('/') {
            "" | "." => String::new(),
            dir => format!("{dir}/"),
        };
        self.entries
            .iter()
            .filter_map(|(key, entry)| {
                let rest = key.strip_prefix(&prefix)?;
                (!rest.contains('/')).then_some(entry)
            })
            .collect()
    }

    /// Rebuild entries and tree from disk.
    pub fn refresh(&mut self) {
        info!(path = %self.root.display(), "Scanning project");
        match scan(&self.root, &self.rules) {
            Ok((entries, tree)) => {
                info!(count = entries.len(), "Project scan complete");
                self.entries = entries;
                self.tree_text = tree;
            }
            Err(IndexError::RootMissing(path)) => {
                warn!(path = %path.display(), "Project root missing; index is empty");
                self.entries.clear();
                self.tree_text = TREE_ROOT_MISSING.to_string();
            }
            Err(e) => {
                warn!("Project scan failed: {e}");
                self.entries.clear();
                self.tree_text = TREE_SCAN_FAILED.to_string();
            }
        }
    }

    /// Text of an indexed file, or a placeholder describing why it is unavailable.
    ///
    /// Returns `None` only when `relative_path` is not in the index.
    #[must_use]
    pub fn get_content(&self, relative_path: &str, max_bytes: u64) -> Option<String> {
        let key = relative_path.replace('\\', "/");
        let Some(entry) = self.entries.get(&key) else {
            debug!(path = %key, "Content requested for non-indexed file");
            return None;
        };
        if entry.size_bytes == 0 {
            return Some(String::new());
        }
        if entry.size_bytes > max_bytes {
            let megabytes = entry.size_bytes as f64 / (1024.0 * 1024.0);
            return Some(format!(
                "[Content of '{key}' is too large to include fully ({megabytes:.2}MB). Consider adding it to context with /add if essential.]"
            ));
        }
        match fs::read(&entry.absolute_path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %entry.absolute_path.display(), "Indexed file vanished from disk");
                Some(format!(
                    "[Error: File '{key}' not found on disk. Please /reindex.]"
                ))
            }
            Err(e) => {
                warn!(path = %entry.absolute_path.display(), "Failed to read indexed file: {e}");
                Some(format!("[OS Error reading content of '{key}': {e}]"))
            }
        }
    }

    /// Case-insensitive substring search over relative paths.
    ///
    /// Returns the first `top_n` matches in index order (sorted by path).
    #[must_use]
    pub fn find_by_substring(&self, query: &str, top_n: usize) -> Vec<&IndexEntry> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| key.to_lowercase().contains(&needle))
            .map(|(_, entry)| entry)
            .take(top_n)
            .collect()
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Directories before files, then by name.
fn tree_order(a: &Path, b: &Path) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.file_name().cmp(&b.file_name()))
}

fn scan(
    root: &Path,
    rules: &IgnoreRules,
) -> Result<(BTreeMap<String, IndexEntry>, String), IndexError> {
    if !root.is_dir() {
        return Err(IndexError::RootMissing(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| IndexError::Walk {
        path: root.to_path_buf(),
        source,
    })?;

    let root_name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut tree_lines = vec![format!("{root_name}/")];
    let mut entries = BTreeMap::new();

    let filter_rules = rules.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_path(tree_order)
        .filter_entry(move |entry| {
            entry.depth() == 0 || !filter_rules.is_ignored(&entry.file_name().to_string_lossy())
        })
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path during scan: {e}");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        let indent = "  ".repeat(entry.depth() - 1);

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            tree_lines.push(format!("{indent}{name}/"));
            continue;
        }
        if !(file_type.is_file() || (file_type.is_symlink() && path.is_file())) {
            continue;
        }

        let size_bytes = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %path.display(), "Could not stat file during indexing: {e}");
                continue;
            }
        };
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let relative_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        tree_lines.push(format!("{indent}{name}"));
        entries.insert(
            relative_path.clone(),
            IndexEntry {
                relative_path,
                absolute_path: path.to_path_buf(),
                size_bytes,
            },
        );
    }

    Ok((entries, tree_lines.join("\n")))
}
