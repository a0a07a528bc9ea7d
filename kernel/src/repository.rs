//! Managed repository definitions.
//!
//! Records here are built once by the sync-config loader and stay immutable
//! for the lifetime of the process.

use std::path::PathBuf;

use crate::chain::BranchRule;

/// Default remote used when the config names none.
pub const DEFAULT_REMOTE: &str = "origin";

/// Identity and sync policy of one managed repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Unique repository name; also the queue label for its jobs.
    pub name: String,
    /// URL used for cloning.
    pub remote_url: String,
    /// Remote whose branches form the chain.
    pub remote_name: String,
    /// Absolute path of the working copy.
    pub local_path: PathBuf,
    /// Branch rules in declared order.
    pub branch_rules: Vec<BranchRule>,
    /// Whether submodules are updated after each fetch.
    pub submodule: bool,
}

impl RepositoryConfig {
    /// Returns `true` if any branch rule covers `git_ref`.
    #[must_use]
    pub fn tracks(&self, git_ref: &str) -> bool {
        self.branch_rules.iter().any(|rule| rule.matches(git_ref))
    }

    /// Rewrites a pushed head ref (`refs/heads/<branch>`) into the matching
    /// remote-tracking ref (`refs/remotes/<remote>/<branch>`). Other refs are
    /// returned unchanged.
    #[must_use]
    pub fn remote_tracking_ref(&self, git_ref: &str) -> String {
        git_ref.replacen("/heads/", &format!("/remotes/{}/", self.remote_name), 1)
    }
}

/// One `git config` key applied to every fresh working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitConfigEntry {
    /// Config key, e.g. `user.name`.
    pub key: String,
    /// Config value.
    pub value: String,
}

impl GitConfigEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
