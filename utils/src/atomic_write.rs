//! Crash-safe replacement of project files.
//!
//! Content goes to a sibling temp file which is then renamed over the target,
//! so an interrupted apply never leaves a half-written source file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Permission bits to restore after the rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// New files get the process umask.
    #[default]
    Default,
    /// Unix mode of the file being replaced. Ignored elsewhere.
    Preserve(u32),
}

impl PersistMode {
    /// Capture the current mode of `path`, if it exists.
    #[must_use]
    pub fn of_existing(path: &Path) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(path) {
                return Self::Preserve(meta.permissions().mode() & 0o7777);
            }
        }
        #[cfg(not(unix))]
        let _ = path;
        Self::Default
    }

    fn restore(self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        if let Self::Preserve(mode) = self {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(())
    }
}

/// Replace `path` with `bytes`, keeping the permission bits of the file being replaced.
///
/// The parent directory must exist. Scripts that were executable stay executable.
pub fn write_preserving_mode(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let mode = PersistMode::of_existing(path);
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    persist_over(staged, path)?;
    mode.restore(path)?;

    debug!(path = %path.display(), bytes = bytes.len(), "File replaced");
    Ok(())
}

/// Rename `staged` onto `path`.
///
/// Where rename refuses to replace an existing file, the old file is moved
/// aside first and put back if the second attempt fails.
fn persist_over(staged: NamedTempFile, path: &Path) -> io::Result<()> {
    let Err(err) = staged.persist(path) else {
        return Ok(());
    };
    if !path.exists() {
        return Err(err.error);
    }

    let aside = path.with_extension("bak");
    let _ = fs::remove_file(&aside);
    fs::rename(path, &aside)?;
    if let Err(retry) = err.file.persist(path) {
        let _ = fs::rename(&aside, path);
        return Err(retry.error);
    }
    if let Err(e) = fs::remove_file(&aside) {
        warn!(path = %aside.display(), "Failed to remove set-aside file: {e}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{PersistMode, write_preserving_mode};

    #[test]
    fn overwrites_without_leaving_set_aside_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");

        write_preserving_mode(&path, b"one").expect("write one");
        write_preserving_mode(&path, b"two").expect("write two");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!path.with_extension("bak").exists());
        assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 1);
    }

    #[test]
    fn fails_when_parent_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("notes.txt");
        assert!(write_preserving_mode(&path, b"data").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\necho old\n").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");

        write_preserving_mode(&path, b"#!/bin/sh\necho new\n").expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "#!/bin/sh\necho new\n"
        );
    }

    #[test]
    fn mode_of_missing_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            PersistMode::of_existing(&dir.path().join("nope")),
            PersistMode::Default
        );
    }
}
