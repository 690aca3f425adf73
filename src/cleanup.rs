//! Forced removal of the working directory.
//!
//! Git checkouts contain read-only object files, which some platforms refuse
//! to delete. When removal fails with a permission error the tree is made
//! writable, and removal is retried once after a short pause.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use walkdir::WalkDir;

use crate::error::CleanupError;

const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nothing existed at the path.
    Absent,
    Removed,
}

/// Remove `path` and everything below it. Blocking; call from
/// `spawn_blocking` in async code.
pub fn force_remove_dir(path: &Path) -> Result<RemoveOutcome, CleanupError> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(RemoveOutcome::Absent);
    }

    match remove(path) {
        Ok(()) => Ok(RemoveOutcome::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::Absent),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "permission denied, clearing read-only flags");
            make_writable(path);
            std::thread::sleep(RETRY_DELAY);
            remove(path)
                .map(|_| RemoveOutcome::Removed)
                .map_err(|source| CleanupError::Locked {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(source) => Err(CleanupError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Async wrapper around [`force_remove_dir`].
pub async fn force_remove_dir_async(path: &Path) -> Result<RemoveOutcome, CleanupError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || force_remove_dir(&owned))
        .await
        .unwrap_or_else(|join_err| {
            Err(CleanupError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(join_err.to_string()),
            })
        })
}

fn remove(path: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn make_writable(path: &Path) {
    for entry in WalkDir::new(path).into_iter().flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mut perms = metadata.permissions();
        set_writable(&mut perms);
        if let Err(e) = std::fs::set_permissions(entry.path(), perms) {
            tracing::debug!(path = %entry.path().display(), error = %e, "could not clear read-only flag");
        }
    }
}

#[cfg(unix)]
fn set_writable(perms: &mut std::fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(perms.mode() | 0o200);
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn set_writable(perms: &mut std::fs::Permissions) {
    perms.set_readonly(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_path() {
        let tmp = TempDir::new().unwrap();
        let outcome = force_remove_dir(&tmp.path().join("repo")).unwrap();
        assert_eq!(outcome, RemoveOutcome::Absent);
    }

    #[test]
    fn test_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(repo.join("pkg")).unwrap();
        std::fs::write(repo.join("pkg/a.py"), "x = 1").unwrap();

        assert_eq!(force_remove_dir(&repo).unwrap(), RemoveOutcome::Removed);
        assert!(!repo.exists());
    }

    #[test]
    fn test_removes_read_only_files() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        let objects = repo.join(".git/objects/ab");
        std::fs::create_dir_all(&objects).unwrap();
        let blob = objects.join("cdef");
        std::fs::write(&blob, "blob").unwrap();
        let mut perms = std::fs::metadata(&blob).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&blob, perms).unwrap();

        assert_eq!(force_remove_dir(&repo).unwrap(), RemoveOutcome::Removed);
        assert!(!repo.exists());
    }

    #[tokio::test]
    async fn test_async_wrapper() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        assert_eq!(
            force_remove_dir_async(&repo).await.unwrap(),
            RemoveOutcome::Removed
        );
        assert_eq!(
            force_remove_dir_async(&repo).await.unwrap(),
            RemoveOutcome::Absent
        );
    }
}
