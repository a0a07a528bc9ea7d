//! GitHub REST client for remediation pull requests.

use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EscalationError;

const USER_AGENT: &str = concat!("gitsync/", env!("CARGO_PKG_VERSION"));

/// Configuration for the GitHub client.
pub struct GitHubConfig {
    /// Access token used as `Authorization: token ...`.
    pub token: SecretString,
    /// API root, e.g. `https://api.github.com/`.
    pub api_base_url: Url,
}

impl GitHubConfig {
    /// Creates a config.
    #[must_use]
    pub fn new(token: SecretString, api_base_url: Url) -> Self {
        Self {
            token,
            api_base_url,
        }
    }
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestSpec {
    /// Title.
    pub title: String,
    /// Branch with the changes.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
    /// Markdown body.
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    html_url: String,
}

/// Owner and repository name parsed from a clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    /// Host name, empty if the URL could not be parsed.
    pub host: String,
    /// Account or organisation.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoCoordinates {
    /// Parses `https://host/owner/repo(.git)`, `ssh://git@host/owner/repo.git`
    /// and scp-like `git@host:owner/repo.git`. When the URL has no usable path
    /// the repository falls back to `fallback_name` with an empty owner.
    #[must_use]
    pub fn parse(remote_url: &str, fallback_name: &str) -> Self {
        let (host, path) = match Url::parse(remote_url) {
            Ok(url) if url.has_host() => (
                url.host_str().unwrap_or_default().to_string(),
                url.path().to_string(),
            ),
            _ => match remote_url.split_once(':') {
                Some((user_host, path)) => (
                    user_host
                        .rsplit('@')
                        .next()
                        .unwrap_or(user_host)
                        .to_string(),
                    path.to_string(),
                ),
                None => (String::new(), String::new()),
            },
        };

        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        match segments.as_slice() {
            [.., owner, repo] => Self {
                host,
                owner: (*owner).to_string(),
                repo: repo.trim_end_matches(".git").to_string(),
            },
            _ => Self {
                host,
                owner: String::new(),
                repo: fallback_name.to_string(),
            },
        }
    }

    /// Browser URL of the repository, empty when the host is unknown.
    #[must_use]
    pub fn web_url(&self) -> String {
        if self.host.is_empty() || self.owner.is_empty() {
            String::new()
        } else {
            format!("https://{}/{}/{}", self.host, self.owner, self.repo)
        }
    }
}

/// Minimal GitHub API client.
pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
}

impl GitHubClient {
    /// Creates a client.
    #[must_use]
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Opens a pull request and returns its browser URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or GitHub answers with anything
    /// other than `201 Created`.
    pub async fn create_pull_request(
        &self,
        coordinates: &RepoCoordinates,
        spec: &PullRequestSpec,
    ) -> Result<String, EscalationError> {
        let url = self
            .config
            .api_base_url
            .join(&format!(
                "repos/{}/{}/pulls",
                coordinates.owner, coordinates.repo
            ))
            .map_err(|e| EscalationError::InvalidUrl(format!("pull request URL: {e}")))?;

        debug!(%url, head = %spec.head, base = %spec.base, "Creating pull request");
        let res = self
            .client
            .post(url)
            .header(
                "Authorization",
                format!("token {}", self.config.token.expose_secret()),
            )
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(spec)
            .send()
            .await?;

        match res.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let body: PullRequestResponse = res.json().await?;
                Ok(body.html_url)
            }
            status => Err(EscalationError::Api {
                service: "GitHub",
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_url() {
        let c = RepoCoordinates::parse("https://github.com/acme/widgets.git", "x");
        assert_eq!(c.host, "github.com");
        assert_eq!(c.owner, "acme");
        assert_eq!(c.repo, "widgets");
        assert_eq!(c.web_url(), "https://github.com/acme/widgets");
    }

    #[test]
    fn parses_scp_like_url() {
        let c = RepoCoordinates::parse("git@github.com:acme/widgets.git", "x");
        assert_eq!((c.host.as_str(), c.owner.as_str(), c.repo.as_str()), ("github.com", "acme", "widgets"));
    }

    #[test]
    fn parses_ssh_url() {
        let c = RepoCoordinates::parse("ssh://git@github.com/acme/widgets", "x");
        assert_eq!((c.owner.as_str(), c.repo.as_str()), ("acme", "widgets"));
    }

    #[test]
    fn falls_back_to_repository_name() {
        let c = RepoCoordinates::parse("/srv/git/widgets", "widgets");
        assert_eq!(c.repo, "widgets");
        assert!(c.web_url().is_empty());
    }
}
