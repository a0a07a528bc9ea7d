//! Shared doubles for executor and orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gitsync_kernel::chain::{BranchMatcher, BranchRule, SortOrder};
use gitsync_kernel::escalation::{ConflictEscalator, ConflictReport, EscalationError};
use gitsync_kernel::infrastructure::sync_config::SyncConfig;
use gitsync_kernel::repository::{GitConfigEntry, RepositoryConfig};
use gitsync_kernel::vcs::{RemoteOptions, VcsError, VersionControl};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// In-memory `VersionControl` that records every call and fails on demand.
#[derive(Default)]
pub struct ScriptedVcs {
    calls: Mutex<Vec<String>>,
    branches: Mutex<Vec<String>>,
    submodules: Vec<String>,
    unresolvable: Vec<String>,
    missing_remote: bool,
    failures: Mutex<HashMap<&'static str, VecDeque<VcsError>>>,
}

impl ScriptedVcs {
    /// A backend whose remote has the given full ref names.
    pub fn with_branches(branches: &[&str]) -> Self {
        Self {
            branches: Mutex::new(branches.iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    /// Adds submodules reported after fetch.
    pub fn with_submodules(mut self, submodules: &[&str]) -> Self {
        self.submodules = submodules.iter().map(ToString::to_string).collect();
        self
    }

    /// Makes `resolve_ref` fail for `reference`.
    pub fn with_unresolvable(mut self, reference: &str) -> Self {
        self.unresolvable.push(reference.to_string());
        self
    }

    /// Makes `has_remote` report the configured remote as absent.
    pub fn without_remote(mut self) -> Self {
        self.missing_remote = true;
        self
    }

    /// Queues an error for the next call of `op`.
    pub fn fail_next(&self, op: &'static str, error: VcsError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls whose description starts with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Index of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn record(&self, op: &'static str, call: String) -> Result<(), VcsError> {
        self.calls.lock().push(call);
        match self.failures.lock().get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VersionControl for ScriptedVcs {
    async fn open(&self, _path: &Path) -> Result<(), VcsError> {
        self.record("open", "open".into())
    }

    async fn clone_repository(
        &self,
        url: &str,
        _path: &Path,
        remote: &str,
        _options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        self.record("clone", format!("clone {url} as {remote}"))
    }

    async fn has_remote(&self, _path: &Path, remote: &str) -> Result<bool, VcsError> {
        self.record("remote", format!("remote {remote}"))?;
        Ok(!self.missing_remote)
    }

    async fn remove_working_copy(&self, _path: &Path) -> Result<(), VcsError> {
        self.record("remove", "remove".into())
    }

    async fn set_config(&self, _path: &Path, key: &str, value: &str) -> Result<(), VcsError> {
        self.record("config", format!("config {key}={value}"))
    }

    async fn remote_branches(&self, _path: &Path, remote: &str) -> Result<Vec<String>, VcsError> {
        self.record("branches", format!("branches {remote}"))?;
        Ok(self.branches.lock().clone())
    }

    async fn fetch(
        &self,
        _path: &Path,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        self.record(
            "fetch",
            format!("fetch {remote} prune={} tags={}", options.prune, options.tags),
        )
    }

    async fn submodules(&self, _path: &Path) -> Result<Vec<String>, VcsError> {
        self.record("submodules", "submodules".into())?;
        Ok(self.submodules.clone())
    }

    async fn update_submodule(
        &self,
        _path: &Path,
        submodule: &str,
        _options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        self.record("update_submodule", format!("update_submodule {submodule}"))
    }

    async fn resolve_ref(&self, _path: &Path, reference: &str) -> Result<String, VcsError> {
        self.record("resolve", format!("resolve {reference}"))?;
        if self.unresolvable.iter().any(|r| r == reference) {
            return Err(VcsError::NotFound(reference.to_string()));
        }
        Ok(reference
            .strip_prefix("refs/remotes/")
            .unwrap_or(reference)
            .to_string())
    }

    async fn pull_branch(
        &self,
        _path: &Path,
        local: &str,
        remote_ref: &str,
    ) -> Result<(), VcsError> {
        self.record("pull", format!("pull {local} <- {remote_ref}"))
    }

    async fn merge(&self, _path: &Path, head: &str, upstream: &str) -> Result<String, VcsError> {
        self.record("merge", format!("merge {upstream} -> {head}"))?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok("c0ffee".into())
    }

    async fn push(
        &self,
        _path: &Path,
        remote: &str,
        branch: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        self.record(
            "push",
            format!("push {remote} {branch} prune={} tags={}", options.prune, options.tags),
        )
    }
}

/// Escalator that records every report.
#[derive(Default)]
pub struct RecordingEscalator {
    reports: Mutex<Vec<ConflictReport>>,
    fail: bool,
}

impl RecordingEscalator {
    /// An escalator whose every attempt fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Reports received so far.
    pub fn reports(&self) -> Vec<ConflictReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ConflictEscalator for RecordingEscalator {
    async fn escalate(&self, report: &ConflictReport) -> Result<(), EscalationError> {
        self.reports.lock().push(report.clone());
        if self.fail {
            return Err(EscalationError::InvalidUrl("unreachable".into()));
        }
        Ok(())
    }
}

/// Full remote-tracking ref of `branch` on `origin`.
pub fn remote(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

/// `release/*` in semver order followed by `develop`.
pub fn release_chain_repo(name: &str) -> anyhow::Result<RepositoryConfig> {
    Ok(RepositoryConfig {
        name: name.to_string(),
        remote_url: format!("https://github.com/acme/{name}.git"),
        remote_name: "origin".into(),
        local_path: PathBuf::from(format!("/srv/{name}")),
        branch_rules: vec![
            BranchRule::new(
                "release",
                BranchMatcher::pattern(r"/release\//")?,
                SortOrder::Semver,
            ),
            BranchRule::literal("develop")?,
        ],
        submodule: false,
    })
}

/// A sync config over the given repositories with one git config entry.
pub fn sync_config(repositories: Vec<RepositoryConfig>) -> SyncConfig {
    SyncConfig {
        repositories,
        git_config: vec![GitConfigEntry::new("user.name", "git-synced")],
    }
}

/// Remote refs for `release/1.0`, `release/2.0` and `develop`.
pub const RELEASE_BRANCHES: [&str; 3] = [
    "refs/remotes/origin/release/2.0",
    "refs/remotes/origin/develop",
    "refs/remotes/origin/release/1.0",
];
