//! The per-hop merge protocol.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::local_branch_name;
use super::outcome::{HopOutcome, HopStep};
use crate::chain::HopPair;
use crate::repository::RepositoryConfig;
use crate::vcs::{GitCredentials, RemoteOptions, VcsError, VersionControl};

/// Runs hops against a repository's working copy.
pub struct HopExecutor<V: ?Sized> {
    vcs: Arc<V>,
}

impl<V: ?Sized> Clone for HopExecutor<V> {
    fn clone(&self) -> Self {
        Self {
            vcs: Arc::clone(&self.vcs),
        }
    }
}

impl<V: VersionControl + ?Sized> HopExecutor<V> {
    /// Creates an executor over a version-control backend.
    pub fn new(vcs: Arc<V>) -> Self {
        Self { vcs }
    }

    /// Executes one hop and classifies the result.
    ///
    /// Steps run strictly in order: open, fetch (plus best-effort submodule
    /// update), ref resolution, local branch refresh, merge, push.
    #[instrument(skip_all, fields(repository = %repo.name, upstream = %pair.upstream, head = %pair.head))]
    pub async fn execute_hop(
        &self,
        credentials: &GitCredentials,
        repo: &RepositoryConfig,
        pair: &HopPair,
    ) -> HopOutcome {
        let outcome = match self.run(credentials, repo, pair).await {
            Ok(merge_commit) => HopOutcome::Success { merge_commit },
            Err(outcome) => outcome,
        };
        metrics::counter!("gitsync_hops_total", "outcome" => outcome.kind()).increment(1);
        outcome
    }

    async fn run(
        &self,
        credentials: &GitCredentials,
        repo: &RepositoryConfig,
        pair: &HopPair,
    ) -> Result<String, HopOutcome> {
        let path = repo.local_path.as_path();

        self.vcs
            .open(path)
            .await
            .map_err(|e| failure(HopStep::Open, e))?;

        info!(remote = %repo.remote_name, "Fetching");
        let fetch_options = credentials.fetch_options();
        self.vcs
            .fetch(path, &repo.remote_name, &fetch_options)
            .await
            .map_err(|e| failure(HopStep::Fetch, e))?;
        if repo.submodule {
            self.update_submodules(path, &fetch_options).await;
        }

        let upstream_ref = self.resolve(path, &pair.upstream).await;
        let head_ref = self.resolve(path, &pair.head).await;
        let upstream = local_branch_name(&upstream_ref, &repo.remote_name);
        let head = local_branch_name(&head_ref, &repo.remote_name);

        for (local, remote_ref) in [(&upstream, &upstream_ref), (&head, &head_ref)] {
            match self.vcs.pull_branch(path, local, remote_ref).await {
                Ok(()) => {}
                Err(VcsError::BranchCheckedOut(branch)) => {
                    debug!(branch, "Branch is checked out, leaving it as is");
                }
                Err(VcsError::Conflict { paths }) => {
                    warn!(branch = %local, "Conflict while pulling {remote_ref}");
                    return Err(HopOutcome::ConflictFailure {
                        conflicting_paths: paths,
                        upstream: upstream.clone(),
                        head: head.clone(),
                    });
                }
                Err(e) => return Err(failure(HopStep::Pull, e)),
            }
        }

        info!("Merging {upstream} into {head}");
        let merge_commit = match self.vcs.merge(path, &head, &upstream).await {
            Ok(commit) => commit,
            Err(VcsError::Conflict { paths }) => {
                warn!(conflicts = paths.len(), "Merge of {upstream} into {head} conflicted");
                return Err(HopOutcome::ConflictFailure {
                    conflicting_paths: paths,
                    upstream,
                    head,
                });
            }
            Err(e) => return Err(failure(HopStep::Merge, e)),
        };
        info!(merge_commit = %merge_commit, "Branch {upstream} merged into {head}");

        info!(remote = %repo.remote_name, branch = %head, "Pushing");
        self.vcs
            .push(path, &repo.remote_name, &head, &credentials.push_options())
            .await
            .map_err(|e| failure(HopStep::Push, e))?;

        Ok(merge_commit)
    }

    async fn update_submodules(&self, path: &Path, options: &RemoteOptions) {
        let submodules = match self.vcs.submodules(path).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Could not list submodules");
                return;
            }
        };
        for submodule in submodules {
            match self.vcs.update_submodule(path, &submodule, options).await {
                Ok(()) => debug!(submodule, "Submodule updated"),
                Err(e) => warn!(submodule, error = %e, "Submodule update failed"),
            }
        }
    }

    /// Short name of `reference`, or `reference` itself if it cannot be resolved.
    async fn resolve(&self, path: &Path, reference: &str) -> String {
        match self.vcs.resolve_ref(path, reference).await {
            Ok(short) => short,
            Err(e) => {
                debug!(reference, error = %e, "Could not resolve ref, using it verbatim");
                reference.to_string()
            }
        }
    }
}

fn failure(step: HopStep, cause: VcsError) -> HopOutcome {
    warn!(%step, error = %cause, "Hop step failed");
    HopOutcome::SystemFailure { step, cause }
}
