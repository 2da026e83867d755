//! Owner-only permissions for the settings database and its directory.

use std::fs::{self, OpenOptions};
use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn ensure_secure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read directory metadata: {}", path.display()))?;

        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }

        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700)).with_context(|| {
                format!("Failed to set directory permissions: {}", path.display())
            })?;
        }
    }
    Ok(())
}

pub(crate) fn ensure_secure_db_file(path: &Path) -> Result<()> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(path)
            .with_context(|| format!("Failed to create database file: {}", path.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let sidecar = sqlite_sidecar_path(path, suffix);
            if sidecar.exists() {
                let _ = fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600));
            }
        }
    }

    Ok(())
}

/// Create the parent directory and database file with owner-only permissions.
pub(crate) fn prepare_db_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_file(path)
}

#[cfg(unix)]
fn sqlite_sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}{suffix}", name.to_string_lossy())),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn database_and_directory_are_owner_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("nested").join("scribe.db");
        prepare_db_path(&db).expect("prepared");

        let file_mode = fs::metadata(&db).expect("file").permissions().mode() & 0o777;
        let dir_mode = fs::metadata(db.parent().expect("parent"))
            .expect("dir")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode & 0o077, 0);
    }

    #[test]
    fn sidecar_paths_append_suffix() {
        assert_eq!(
            sqlite_sidecar_path(Path::new("/d/scribe.db"), "-wal"),
            PathBuf::from("/d/scribe.db-wal")
        );
    }
}
