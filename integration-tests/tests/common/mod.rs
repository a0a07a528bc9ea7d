//! Shared test utilities for end-to-end tests.
//!
//! Builds a bare "remote" repository plus a seed clone used to push commits,
//! all inside a temporary directory.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use gitsync_kernel::chain::{BranchMatcher, BranchRule, SortOrder};
use gitsync_kernel::escalation::{ConflictEscalator, ConflictReport, EscalationError};
use gitsync_kernel::infrastructure::sync_config::SyncConfig;
use gitsync_kernel::orchestrator::Orchestrator;
use gitsync_kernel::queue::JobQueue;
use gitsync_kernel::repository::{GitConfigEntry, RepositoryConfig};
use gitsync_kernel::vcs::{GitCli, GitCredentials};
use std::path::{Path, PathBuf};
use std::process::Command;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Returns `true` when a `git` binary is available.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Runs git in `dir` with a fixed identity and returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Seed",
            "-c",
            "user.email=seed@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Escalator that records reports.
#[derive(Default)]
pub struct RecordingEscalator {
    reports: Mutex<Vec<ConflictReport>>,
}

impl RecordingEscalator {
    /// Reports received so far.
    pub fn reports(&self) -> Vec<ConflictReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ConflictEscalator for RecordingEscalator {
    async fn escalate(&self, report: &ConflictReport) -> Result<(), EscalationError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// A bare remote with `develop`, `release/1.0` and `release/2.0`, a seed
/// clone to push from, and an orchestrator syncing a third working copy.
pub struct Fixture {
    /// Keeps the directory alive.
    pub dir: TempDir,
    /// Bare remote repository.
    pub remote: PathBuf,
    /// Clone used to create upstream commits.
    pub seed: PathBuf,
    /// Escalation double.
    pub escalator: Arc<RecordingEscalator>,
    /// Queue the orchestrator submits to.
    pub queue: JobQueue,
    /// System under test.
    pub orchestrator: Orchestrator<GitCli, RecordingEscalator>,
}

impl Fixture {
    /// Builds the repositories and prepares the managed working copy.
    pub async fn new() -> Result<Self> {
        Self::with_remote_name("origin").await
    }

    /// Like [`Fixture::new`], with the managed copy's remote named `remote_name`.
    pub async fn with_remote_name(remote_name: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let remote = dir.path().join("origin.git");
        let seed = dir.path().join("seed");

        git(dir.path(), &["init", "--bare", "origin.git"])?;
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/develop"])?;
        git(dir.path(), &["init", "seed"])?;
        git(&seed, &["checkout", "-b", "develop"])?;
        std::fs::write(seed.join("shared.txt"), "base\n")?;
        git(&seed, &["add", "."])?;
        git(&seed, &["commit", "-m", "initial"])?;
        git(&seed, &["branch", "release/1.0"])?;
        git(&seed, &["branch", "release/2.0"])?;
        let remote_url = remote.to_string_lossy().to_string();
        git(&seed, &["remote", "add", "origin", &remote_url])?;
        git(&seed, &["push", "origin", "--all"])?;

        let repo = RepositoryConfig {
            name: "widgets".into(),
            remote_url,
            remote_name: remote_name.into(),
            local_path: dir.path().join("work").join("widgets"),
            branch_rules: vec![
                BranchRule::new(
                    "release",
                    BranchMatcher::pattern(r"/release\//")?,
                    SortOrder::Semver,
                ),
                BranchRule::literal("develop")?,
            ],
            submodule: false,
        };
        let sync = SyncConfig {
            repositories: vec![repo],
            git_config: vec![
                GitConfigEntry::new("user.name", "git-synced"),
                GitConfigEntry::new("user.email", "sync@example.com"),
                GitConfigEntry::new("commit.gpgsign", "false"),
            ],
        };

        let escalator = Arc::new(RecordingEscalator::default());
        let (queue, _worker) = JobQueue::start();
        let orchestrator = Orchestrator::new(
            sync,
            GitCredentials::anonymous(),
            Arc::new(GitCli::new()),
            Arc::clone(&escalator),
            queue.clone(),
        );
        if orchestrator.prepare_repositories().await != 1 {
            bail!("working copy was not prepared");
        }

        Ok(Self {
            dir,
            remote,
            seed,
            escalator,
            queue,
            orchestrator,
        })
    }

    /// Path of the managed working copy.
    pub fn work(&self) -> PathBuf {
        self.dir.path().join("work").join("widgets")
    }

    /// Commits `content` to `file` on `branch` in the seed and pushes it.
    pub fn commit_and_push(&self, branch: &str, file: &str, content: &str, message: &str) -> Result<()> {
        git(&self.seed, &["checkout", branch])?;
        std::fs::write(self.seed.join(file), content)?;
        git(&self.seed, &["add", file])?;
        git(&self.seed, &["commit", "-m", message])?;
        git(&self.seed, &["push", "origin", branch])?;
        Ok(())
    }

    /// Returns `true` if `ancestor` is contained in `branch` on the remote.
    pub fn remote_contains(&self, branch: &str, ancestor: &str) -> Result<bool> {
        let status = Command::new("git")
            .current_dir(&self.remote)
            .args(["merge-base", "--is-ancestor", ancestor, branch])
            .status()?;
        Ok(status.success())
    }

    /// Waits until the queue has nothing pending or in flight.
    pub async fn wait_until_idle(&self) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.queue.pending_len() > 0 || self.queue.in_flight().is_some() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await?;
        Ok(())
    }
}
