//! Pid file guard.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Holds the pid file for the lifetime of the process and removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id to `path`, replacing a stale file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            warn!(path = %path.display(), "Replacing existing pid file");
        }
        std::fs::write(&path, std::process::id().to_string())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        info!(path = %path.display(), pid = std::process::id(), "Pid file written");
        Ok(Self { path })
    }

    /// Path of the pid file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove pid file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_pid_and_removes_on_drop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("git-synced.pid");
        std::fs::write(&path, "stale")?;

        let pid_file = PidFile::create(&path)?;
        assert_eq!(std::fs::read_to_string(pid_file.path())?, std::process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
        Ok(())
    }
}
