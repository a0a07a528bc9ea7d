//! Working-copy provisioning: first clone, destructive re-clone and the
//! post-clone git configuration.

use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use super::{GitCredentials, VcsError, VersionControl};
use crate::repository::{GitConfigEntry, RepositoryConfig};

const WRITE_CHECK_FILE: &str = ".gitsync-write-check";

/// Clones the repository unless a working copy already exists at its path,
/// then applies `git_config`.
///
/// # Errors
///
/// Returns an error if an existing path is not a writable working copy with
/// the configured remote, or if cloning or configuring fails.
pub async fn ensure_working_copy<V: VersionControl + ?Sized>(
    vcs: &V,
    credentials: &GitCredentials,
    repo: &RepositoryConfig,
    git_config: &[GitConfigEntry],
) -> Result<(), VcsError> {
    let path = &repo.local_path;
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            check_writable(path).await?;
            info!(repository = %repo.name, path = %path.display(), "Working copy exists, skipping clone");
            vcs.open(path).await?;
            if !vcs.has_remote(path, &repo.remote_name).await? {
                return Err(VcsError::NotFound(format!(
                    "remote \"{}\" in {}",
                    repo.remote_name,
                    path.display()
                )));
            }
        }
        Ok(_) => return Err(VcsError::NotARepository(path.clone())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            clone(vcs, credentials, repo).await?;
        }
        Err(e) => return Err(e.into()),
    }
    apply_git_config(vcs, repo, git_config).await
}

/// Fails unless this process can create a file inside `dir`.
async fn check_writable(dir: &Path) -> Result<(), VcsError> {
    let marker = dir.join(WRITE_CHECK_FILE);
    tokio::fs::write(&marker, b"").await.map_err(|e| {
        VcsError::Io(std::io::Error::new(
            e.kind(),
            format!("{} is not writable: {e}", dir.display()),
        ))
    })?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

/// Removes the working copy and clones it again, then applies `git_config`.
///
/// # Errors
///
/// Returns an error if removal, cloning or configuring fails.
pub async fn reclone<V: VersionControl + ?Sized>(
    vcs: &V,
    credentials: &GitCredentials,
    repo: &RepositoryConfig,
    git_config: &[GitConfigEntry],
) -> Result<(), VcsError> {
    warn!(repository = %repo.name, path = %repo.local_path.display(), "Removing working copy");
    vcs.remove_working_copy(&repo.local_path).await?;
    clone(vcs, credentials, repo).await?;
    apply_git_config(vcs, repo, git_config).await
}

/// Writes every entry into the working copy's git config, in order.
///
/// # Errors
///
/// Stops at the first entry git refuses.
pub async fn apply_git_config<V: VersionControl + ?Sized>(
    vcs: &V,
    repo: &RepositoryConfig,
    git_config: &[GitConfigEntry],
) -> Result<(), VcsError> {
    for entry in git_config {
        info!(repository = %repo.name, key = %entry.key, value = %entry.value, "Setting git config");
        vcs.set_config(&repo.local_path, &entry.key, &entry.value)
            .await?;
    }
    Ok(())
}

async fn clone<V: VersionControl + ?Sized>(
    vcs: &V,
    credentials: &GitCredentials,
    repo: &RepositoryConfig,
) -> Result<(), VcsError> {
    info!(
        repository = %repo.name,
        url = %repo.remote_url,
        remote = %repo.remote_name,
        path = %repo.local_path.display(),
        "Cloning"
    );
    let started = Instant::now();
    vcs.clone_repository(
        &repo.remote_url,
        &repo.local_path,
        &repo.remote_name,
        &credentials.fetch_options(),
    )
    .await?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(repository = %repo.name, elapsed_ms, "Clone finished");
    Ok(())
}
