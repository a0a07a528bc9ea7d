//! Version-control collaborator.
//!
//! The sync pipeline only talks to git through [`VersionControl`]; the
//! shipped [`GitCli`] drives the `git` binary. Every method is a suspension
//! point.

pub mod cli;
pub mod provision;

pub use cli::GitCli;
pub use provision::{apply_git_config, ensure_working_copy, reclone};

use async_trait::async_trait;
use secrecy::SecretString;
use std::path::{Path, PathBuf};

/// Errors reported by the version-control layer.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// A merge stopped with unmerged index entries.
    #[error("Merge conflict in {} path(s): {}", paths.len(), paths.join(", "))]
    Conflict {
        /// Conflicting paths, one per unmerged entry.
        paths: Vec<String>,
    },
    /// The branch cannot be force-updated because it is checked out.
    #[error("Branch {0} is checked out")]
    BranchCheckedOut(String),
    /// A ref or object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The path is not a usable working copy.
    #[error("Not a git working copy: {}", .0.display())]
    NotARepository(PathBuf),
    /// A git invocation exited unsuccessfully.
    #[error("git {command} failed with exit code {code}: {stderr}")]
    Command {
        /// Sub-command that failed.
        command: String,
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },
    /// Filesystem or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for a network operation against a remote.
#[derive(Debug, Clone, Default)]
pub struct RemoteOptions {
    /// Access token, if any.
    pub credential: Option<SecretString>,
    /// Prune stale remote-tracking refs.
    pub prune: bool,
    /// Fetch all tags.
    pub tags: bool,
}

/// Read-only access credential for the remote.
#[derive(Debug, Clone, Default)]
pub struct GitCredentials {
    token: Option<SecretString>,
}

impl GitCredentials {
    /// Credentials backed by an access token. An empty token means anonymous.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        use secrecy::ExposeSecret;
        if token.expose_secret().is_empty() {
            Self::anonymous()
        } else {
            Self { token: Some(token) }
        }
    }

    /// No credential at all.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// Options for fetch and clone.
    #[must_use]
    pub fn fetch_options(&self) -> RemoteOptions {
        RemoteOptions {
            credential: self.token.clone(),
            prune: true,
            tags: true,
        }
    }

    /// Options for push: outbound, so no tag or prune handling.
    #[must_use]
    pub fn push_options(&self) -> RemoteOptions {
        RemoteOptions {
            credential: self.token.clone(),
            prune: false,
            tags: false,
        }
    }
}

/// Primitive git operations used by the sync pipeline.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Verifies that `path` holds a usable working copy.
    async fn open(&self, path: &Path) -> Result<(), VcsError>;

    /// Clones `url` into `path`, naming the remote `remote`.
    async fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError>;

    /// Returns `true` if the working copy at `path` has a remote named `remote`.
    async fn has_remote(&self, path: &Path, remote: &str) -> Result<bool, VcsError>;

    /// Deletes the working copy at `path`; a missing path is not an error.
    async fn remove_working_copy(&self, path: &Path) -> Result<(), VcsError>;

    /// Writes a key into the working copy's local git config.
    async fn set_config(&self, path: &Path, key: &str, value: &str) -> Result<(), VcsError>;

    /// Lists full remote-tracking ref names of `remote`.
    async fn remote_branches(&self, path: &Path, remote: &str) -> Result<Vec<String>, VcsError>;

    /// Fetches all refs from `remote`.
    async fn fetch(&self, path: &Path, remote: &str, options: &RemoteOptions)
        -> Result<(), VcsError>;

    /// Lists submodule paths recorded by the superproject.
    async fn submodules(&self, path: &Path) -> Result<Vec<String>, VcsError>;

    /// Initializes a submodule and checks out the recorded commit.
    async fn update_submodule(
        &self,
        path: &Path,
        submodule: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError>;

    /// Resolves a ref to its short name.
    async fn resolve_ref(&self, path: &Path, reference: &str) -> Result<String, VcsError>;

    /// Brings local branch `local` up to date with `remote_ref`, creating it
    /// when missing.
    async fn pull_branch(&self, path: &Path, local: &str, remote_ref: &str)
        -> Result<(), VcsError>;

    /// Merges `upstream` into `head` and returns the resulting commit id.
    async fn merge(&self, path: &Path, head: &str, upstream: &str) -> Result<String, VcsError>;

    /// Pushes local branch `branch` to the same name on `remote`.
    async fn push(
        &self,
        path: &Path,
        remote: &str,
        branch: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_and_push_options_differ_only_in_flags() {
        let creds = GitCredentials::new(SecretString::new("t0k3n".into()));
        let fetch = creds.fetch_options();
        let push = creds.push_options();
        assert!(fetch.prune && fetch.tags);
        assert!(!push.prune && !push.tags);
        assert!(fetch.credential.is_some() && push.credential.is_some());
    }

    #[test]
    fn empty_token_is_anonymous() {
        let creds = GitCredentials::new(SecretString::new("".into()));
        assert!(creds.fetch_options().credential.is_none());
    }

    #[test]
    fn conflict_lists_paths() {
        let err = VcsError::Conflict {
            paths: vec!["a.txt".into(), "b.txt".into()],
        };
        assert_eq!(err.to_string(), "Merge conflict in 2 path(s): a.txt, b.txt");
    }
}
