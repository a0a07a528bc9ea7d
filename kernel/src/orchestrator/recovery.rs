//! Failure policies.

use tracing::{error, info, warn};

use super::{log_settlement, Orchestrator};
use crate::escalation::{ConflictEscalator, ConflictReport};
use crate::infrastructure::audit::{self, AuditEvent};
use crate::repository::RepositoryConfig;
use crate::vcs::{provision, VersionControl};

impl<V, E> Orchestrator<V, E>
where
    V: VersionControl + ?Sized + 'static,
    E: ConflictEscalator + ?Sized + 'static,
{
    /// Conflict policy: drop the repository's stale jobs and escalate once.
    /// Escalation errors are logged and never retried.
    pub(super) async fn escalate(
        &self,
        repo: &RepositoryConfig,
        trigger_ref: &str,
        upstream: String,
        head: String,
        conflicting_paths: Vec<String>,
    ) {
        let canceled = self.inner.queue.cancel_pending(&repo.name);
        warn!(
            repository = %repo.name,
            upstream = %upstream,
            head = %head,
            files = conflicting_paths.len(),
            canceled,
            "Merge conflict, escalating"
        );

        let report = ConflictReport {
            repository: repo.name.clone(),
            remote_url: repo.remote_url.clone(),
            trigger_ref: trigger_ref.to_string(),
            upstream,
            head,
            conflicting_paths,
        };
        audit::log_audit(&AuditEvent::ConflictEscalated {
            repository: report.repository.clone(),
            upstream: report.upstream.clone(),
            head: report.head.clone(),
            files: report.unique_paths().len(),
        });
        match self.inner.escalator.escalate(&report).await {
            Ok(()) => info!(repository = %repo.name, "Conflict escalated"),
            Err(e) => error!(repository = %repo.name, error = %e, "Conflict escalation failed"),
        }
    }

    /// Re-clone policy: drop the repository's stale jobs, rebuild its working
    /// copy and queue its whole chain again.
    pub(super) async fn recover(&self, repo: &RepositoryConfig, reason: &str) -> anyhow::Result<()> {
        let canceled = self.inner.queue.cancel_pending(&repo.name);
        error!(repository = %repo.name, reason, canceled, "Hop failed, re-cloning repository");

        provision::reclone(
            self.inner.vcs.as_ref(),
            &self.inner.credentials,
            repo,
            &self.inner.sync.git_config,
        )
        .await?;
        metrics::counter!("gitsync_reclones_total").increment(1);
        audit::log_audit(&AuditEvent::RepositoryRecloned {
            repository: repo.name.clone(),
            reason: reason.to_string(),
        });

        let handles = self.queue_full_sync(&repo.name).await?;
        info!(repository = %repo.name, jobs = handles.len(), "Repository re-cloned, full sync queued");
        for handle in handles {
            tokio::spawn(log_settlement(handle, "re-clone".into()));
        }
        Ok(())
    }
}
