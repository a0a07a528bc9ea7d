//! Wires push notifications to the queue and owns the recovery policies.
//!
//! A push is resolved to the next hop of its repository's chain and queued as
//! one job. The job runs the hop and reacts to its outcome:
//!
//! - conflict: cancel the repository's pending jobs and escalate once;
//! - any other failure: cancel the repository's pending jobs, re-clone the
//!   working copy and queue the repository's full hop list again.

mod recovery;

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::chain::{hop_pairs, resolve_chain, ChainError, HopPair};
use crate::escalation::ConflictEscalator;
use crate::hop::{HopExecutor, HopOutcome};
use crate::infrastructure::sync_config::SyncConfig;
use crate::queue::{Job, JobHandle, JobQueue, JobStatus, QueueError};
use crate::repository::RepositoryConfig;
use crate::vcs::{provision, GitCredentials, VersionControl};
use crate::webhook::PushNotification;

struct Inner<V: ?Sized, E: ?Sized> {
    sync: SyncConfig,
    credentials: GitCredentials,
    vcs: Arc<V>,
    executor: HopExecutor<V>,
    escalator: Arc<E>,
    queue: JobQueue,
}

/// Turns pushes into hop jobs and applies the failure policies.
pub struct Orchestrator<V: ?Sized, E: ?Sized> {
    inner: Arc<Inner<V, E>>,
}

impl<V: ?Sized, E: ?Sized> Clone for Orchestrator<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> Orchestrator<V, E>
where
    V: VersionControl + ?Sized + 'static,
    E: ConflictEscalator + ?Sized + 'static,
{
    /// Creates an orchestrator submitting to `queue`.
    pub fn new(
        sync: SyncConfig,
        credentials: GitCredentials,
        vcs: Arc<V>,
        escalator: Arc<E>,
        queue: JobQueue,
    ) -> Self {
        let executor = HopExecutor::new(Arc::clone(&vcs));
        Self {
            inner: Arc::new(Inner {
                sync,
                credentials,
                vcs,
                executor,
                escalator,
                queue,
            }),
        }
    }

    /// The queue jobs are submitted to.
    #[must_use]
    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }

    /// The loaded sync config.
    #[must_use]
    pub fn sync_config(&self) -> &SyncConfig {
        &self.inner.sync
    }

    fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.inner.sync.repository(name)
    }

    /// Clones missing working copies and applies the git config. Returns the
    /// number of repositories that are ready; failures are logged.
    pub async fn prepare_repositories(&self) -> usize {
        let mut ready = 0;
        for repo in &self.inner.sync.repositories {
            match provision::ensure_working_copy(
                self.inner.vcs.as_ref(),
                &self.inner.credentials,
                repo,
                &self.inner.sync.git_config,
            )
            .await
            {
                Ok(()) => ready += 1,
                Err(e) => warn!(repository = %repo.name, error = %e, "Working copy setup failed"),
            }
        }
        info!(ready, total = self.inner.sync.repositories.len(), "Repositories prepared");
        ready
    }

    /// Queues the full hop list of every repository, once.
    pub async fn sync_all(&self) -> Vec<JobHandle> {
        let mut handles = Vec::new();
        for repo in &self.inner.sync.repositories {
            match self.queue_full_sync(&repo.name).await {
                Ok(mut queued) => handles.append(&mut queued),
                Err(e) => warn!(repository = %repo.name, error = %e, "Could not queue full sync"),
            }
        }
        info!(jobs = handles.len(), "Full sync queued");
        handles
    }

    /// Queues one job per hop of the repository's chain, unwindowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is unknown, its branches cannot be
    /// listed, or the queue refuses the jobs.
    pub async fn queue_full_sync(&self, repository: &str) -> anyhow::Result<Vec<JobHandle>> {
        let repo = self
            .repository(repository)
            .with_context(|| format!("Unknown repository \"{repository}\""))?;
        let pairs = self.chain_hops(repo, None, None).await?;
        debug!(repository, hops = pairs.len(), "Queueing full sync");
        pairs
            .into_iter()
            .map(|pair| {
                self.queue_hop_job(repository, pair, None)
                    .map_err(anyhow::Error::from)
            })
            .collect()
    }

    /// Maps a push notification to at most one queued job.
    ///
    /// Pushes to unknown repositories or to branches outside every rule are
    /// ignored. The pushed head ref is rewritten to its remote-tracking ref
    /// and only the next hop from there is queued; a push to the chain tail
    /// queues nothing.
    pub async fn handle_push(&self, notification: &PushNotification) -> Option<JobHandle> {
        let Some(repo) = self.repository(&notification.repository) else {
            info!(event_key = %notification.event_key(), "Push for unmanaged repository ignored");
            return None;
        };
        if !repo.tracks(&notification.git_ref) {
            debug!(
                repository = %repo.name,
                git_ref = %notification.git_ref,
                "Pushed branch is not part of the chain"
            );
            return None;
        }

        let remote_ref = repo.remote_tracking_ref(&notification.git_ref);
        let pair = match self.chain_hops(repo, Some(&remote_ref), Some(1)).await {
            Ok(pairs) => pairs.into_iter().next()?,
            Err(e) if e.downcast_ref::<ChainError>().is_some() => {
                warn!(repository = %repo.name, error = %e, "Pushed ref is not in the chain");
                return None;
            }
            Err(e) => {
                warn!(repository = %repo.name, error = %format!("{e:#}"), "Could not resolve next hop");
                return None;
            }
        };

        match self.queue_hop_job(&repo.name, pair, Some(remote_ref)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(repository = %repo.name, error = %e, "Push not queued");
                None
            }
        }
    }

    /// Submits a job executing `pair`. `trigger_ref` is the pushed ref that
    /// caused it, reported on conflict; full-sync jobs use the upstream.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Stopped` if the queue no longer accepts work.
    pub fn queue_hop_job(
        &self,
        repository: &str,
        pair: HopPair,
        trigger_ref: Option<String>,
    ) -> Result<JobHandle, QueueError> {
        let this = self.clone();
        let name = repository.to_string();
        let trigger = trigger_ref.unwrap_or_else(|| pair.upstream.clone());
        debug!(repository, hop = %pair, "Queueing hop");
        let job = Job::new(repository, move || async move {
            this.run_hop(&name, &pair, &trigger).await
        });
        let handle = self.inner.queue.submit(job)?;
        debug!(repository, job_id = %handle.id(), "Hop job queued");
        Ok(handle)
    }

    /// Receives notifications until the sender side is closed.
    pub async fn run_notifications(self, mut notifications: mpsc::Receiver<PushNotification>) {
        while let Some(notification) = notifications.recv().await {
            if let Some(handle) = self.handle_push(&notification).await {
                tokio::spawn(log_settlement(handle, notification.git_ref));
            }
        }
        debug!("Notification channel closed");
    }

    /// Job body: executes one hop and applies the failure policy.
    ///
    /// # Errors
    ///
    /// Returns an error only when recovery itself fails.
    #[instrument(skip(self, pair), fields(hop = %pair))]
    pub async fn run_hop(
        &self,
        repository: &str,
        pair: &HopPair,
        trigger_ref: &str,
    ) -> anyhow::Result<()> {
        let repo = self
            .repository(repository)
            .with_context(|| format!("Unknown repository \"{repository}\""))?;

        match self
            .inner
            .executor
            .execute_hop(&self.inner.credentials, repo, pair)
            .await
        {
            HopOutcome::Success { merge_commit } => {
                info!(merge_commit = %merge_commit, "Hop completed");
                Ok(())
            }
            HopOutcome::ConflictFailure {
                conflicting_paths,
                upstream,
                head,
            } => {
                self.escalate(repo, trigger_ref, upstream, head, conflicting_paths)
                    .await;
                Ok(())
            }
            HopOutcome::SystemFailure { step, cause } => {
                self.recover(repo, &format!("{step} failed: {cause}")).await
            }
        }
    }

    async fn chain_hops(
        &self,
        repo: &RepositoryConfig,
        start: Option<&str>,
        max_hops: Option<usize>,
    ) -> anyhow::Result<Vec<HopPair>> {
        let branches = self
            .inner
            .vcs
            .remote_branches(&repo.local_path, &repo.remote_name)
            .await
            .with_context(|| format!("Listing branches of \"{}\"", repo.name))?;
        let chain = resolve_chain(&branches, &repo.branch_rules);
        debug!(repository = %repo.name, chain = ?chain, "Chain resolved");
        Ok(hop_pairs(&chain, start, max_hops)?)
    }
}

/// Logs how a job settled. `trigger` names what queued it.
pub async fn log_settlement(handle: JobHandle, trigger: String) {
    let label = handle.label().to_string();
    match handle.settled().await {
        JobStatus::Processed => debug!(label, trigger, "Job processed"),
        JobStatus::Canceled => info!(label, trigger, "Job was canceled"),
        JobStatus::Failed(reason) => warn!(label, trigger, reason, "Job failed"),
    }
}
