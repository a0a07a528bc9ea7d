//! Tagged result of one hop.

use std::fmt;

use crate::vcs::VcsError;

/// Protocol step at which a hop failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopStep {
    /// Opening the working copy.
    Open,
    /// Fetching from the remote.
    Fetch,
    /// Refreshing a local branch from its remote counterpart.
    Pull,
    /// Merging upstream into head.
    Merge,
    /// Pushing head.
    Push,
}

impl fmt::Display for HopStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Fetch => "fetch",
            Self::Pull => "pull",
            Self::Merge => "merge",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// How a hop ended.
#[derive(Debug)]
pub enum HopOutcome {
    /// `head` now contains `upstream` and was pushed.
    Success {
        /// Commit id produced by the merge.
        merge_commit: String,
    },
    /// The merge (or a pull) stopped on conflicts that need a human.
    ConflictFailure {
        /// Paths of the conflicting index entries.
        conflicting_paths: Vec<String>,
        /// Local name of the upstream branch.
        upstream: String,
        /// Local name of the head branch.
        head: String,
    },
    /// Any other failure.
    SystemFailure {
        /// Step that failed.
        step: HopStep,
        /// Underlying error.
        cause: VcsError,
    },
}

impl HopOutcome {
    /// Short label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::ConflictFailure { .. } => "conflict",
            Self::SystemFailure { .. } => "system_failure",
        }
    }

    /// Returns `true` for [`HopOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
