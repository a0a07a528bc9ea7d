//! Conflict escalation.
//!
//! When a hop cannot be merged automatically a remediation pull request is
//! opened and a mail goes out. Both are best-effort: failures are logged and
//! never retried.

pub mod github;
pub mod mailgun;
pub mod report;

pub use github::{GitHubClient, GitHubConfig, RepoCoordinates};
pub use mailgun::{Mail, MailgunConfig, MailgunMailer};
pub use report::ConflictReport;

use async_trait::async_trait;
use tracing::{info, warn};

/// Errors from the escalation collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// The HTTP request could not be sent or its body not decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("{service} responded with HTTP {status}: {body}")]
    Api {
        /// Which service answered.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// A URL could not be built or parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Human-facing fallback for a conflicting hop.
#[async_trait]
pub trait ConflictEscalator: Send + Sync {
    /// Escalates one conflict. Called exactly once per conflicting hop.
    async fn escalate(&self, report: &ConflictReport) -> Result<(), EscalationError>;
}

/// Opens a pull request on GitHub and mails the conflict report.
pub struct GitHubEscalator {
    github: GitHubClient,
    mailer: Option<MailgunMailer>,
}

impl GitHubEscalator {
    /// Creates an escalator; without a mailer only the pull request is opened.
    #[must_use]
    pub fn new(github: GitHubClient, mailer: Option<MailgunMailer>) -> Self {
        Self { github, mailer }
    }
}

#[async_trait]
impl ConflictEscalator for GitHubEscalator {
    async fn escalate(&self, report: &ConflictReport) -> Result<(), EscalationError> {
        let coordinates = RepoCoordinates::parse(&report.remote_url, &report.repository);

        let pr_url = match self
            .github
            .create_pull_request(&coordinates, &report.pull_request())
            .await
        {
            Ok(url) => {
                info!(repository = %report.repository, pr_url = %url, "Remediation pull request opened");
                metrics::counter!("gitsync_escalations_total", "result" => "pr_opened").increment(1);
                Some(url)
            }
            Err(e) => {
                warn!(
                    repository = %report.repository,
                    upstream = %report.upstream,
                    head = %report.head,
                    error = %e,
                    "Could not open remediation pull request"
                );
                metrics::counter!("gitsync_escalations_total", "result" => "pr_failed").increment(1);
                None
            }
        };

        let Some(mailer) = &self.mailer else {
            info!("Mail settings missing, skipping conflict mail");
            return Ok(());
        };
        let mail = report.mail(&coordinates.web_url(), pr_url.as_deref());
        mailer.send(&mail).await?;
        metrics::counter!("gitsync_escalations_total", "result" => "mail_sent").increment(1);
        Ok(())
    }
}
