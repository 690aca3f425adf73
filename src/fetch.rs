//! Repository fetching.
//!
//! A [`RepoFetcher`] places a checkout of a remote repository at a local
//! path. The production implementation shells out to the `git` binary;
//! tests substitute a fetcher that writes fixture files instead.
//!
//! Any previous contents of the destination are removed first, so the
//! working directory always holds exactly one repository.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::cleanup::force_remove_dir_async;
use crate::config::FetchConfig;
use crate::error::FetchError;

#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// Replace whatever is at `dest` with a checkout of `url`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Fetches with `git clone` on the default branch.
#[derive(Debug, Clone, Default)]
pub struct GitFetcher {
    shallow: bool,
}

impl GitFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            shallow: config.shallow,
        }
    }
}

#[async_trait]
impl RepoFetcher for GitFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        prepare_destination(dest).await?;

        tracing::info!(url, dest = %dest.display(), shallow = self.shallow, "cloning repository");

        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if self.shallow {
            cmd.args(["--depth", "1"]);
        }
        cmd.arg("--").arg(url).arg(dest);

        let output = cmd.output().await.map_err(FetchError::GitMissing)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::CloneFailed(stderr.trim().to_string()));
        }

        tracing::info!(dest = %dest.display(), "clone complete");
        Ok(())
    }
}

/// Clear `dest` and make sure its parent exists.
pub async fn prepare_destination(dest: &Path) -> Result<(), FetchError> {
    force_remove_dir_async(dest)
        .await
        .map_err(|e| FetchError::Workdir {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::Workdir {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_destination_clears_previous_checkout() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("work/repo");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.py"), "old = True").unwrap();

        prepare_destination(&dest).await.unwrap();

        assert!(!dest.exists());
        assert!(dest.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_clone_of_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("repo");
        let bogus = tmp.path().join("no-such-repo");

        let fetcher = GitFetcher::default();
        let err = fetcher
            .fetch(bogus.to_str().unwrap(), &dest)
            .await
            .unwrap_err();

        // Either git is absent or the clone itself fails; both are errors.
        assert!(matches!(
            err,
            FetchError::GitMissing(_) | FetchError::CloneFailed(_)
        ));
    }
}
