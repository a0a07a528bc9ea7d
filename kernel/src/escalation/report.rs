//! Conflict report and the text rendered from it.

use std::collections::HashSet;

use super::github::PullRequestSpec;
use super::mailgun::Mail;

/// Everything a human needs to resolve a conflicting hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    /// Repository name.
    pub repository: String,
    /// Clone URL of the repository.
    pub remote_url: String,
    /// Ref whose push triggered the hop.
    pub trigger_ref: String,
    /// Branch that could not be merged.
    pub upstream: String,
    /// Branch it should have been merged into.
    pub head: String,
    /// Conflicting paths as reported by the merge.
    pub conflicting_paths: Vec<String>,
}

impl ConflictReport {
    /// Pull request asking for `upstream` to be merged into `head` by hand.
    #[must_use]
    pub fn pull_request(&self) -> PullRequestSpec {
        PullRequestSpec {
            title: format!(
                "[git-synced]: conflict for \"{}\" -> \"{}\"",
                self.upstream, self.head
            ),
            head: self.upstream.clone(),
            base: self.head.clone(),
            body: format!(
                "This PR was created because \"{upstream}\" could not be merged into \"{head}\" automatically.\n\
                 Please fix the conflicts and merge branch \"{upstream}\" manually.",
                upstream = self.upstream,
                head = self.head,
            ),
        }
    }

    /// Conflicting paths without duplicates, in first-seen order.
    #[must_use]
    pub fn unique_paths(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.conflicting_paths
            .iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// HTML mail describing the conflict.
    #[must_use]
    pub fn mail(&self, repository_url: &str, pr_url: Option<&str>) -> Mail {
        let repository = escape_html(&self.repository);
        let repo_link = if repository_url.is_empty() {
            format!("\"{repository}\"")
        } else {
            format!(
                "<a href=\"{}\">\"{repository}\"</a>",
                escape_html(repository_url)
            )
        };

        let description = if self.upstream.is_empty() || self.head.is_empty() {
            format!("\"{}\" in repository {repo_link}", escape_html(&self.trigger_ref))
        } else {
            format!(
                "\"{}\" into \"{}\" in repository {repo_link}",
                escape_html(&self.upstream),
                escape_html(&self.head)
            )
        };

        let mut html = format!("<p>A merge conflict occurred while trying to merge {description}.</p>\n");
        if let Some(url) = pr_url {
            let url = escape_html(url);
            html.push_str(&format!(
                "<p>See the conflicts: <a href=\"{url}\">{url}</a></p>\n"
            ));
        }
        let files = self.unique_paths();
        if !files.is_empty() {
            html.push_str("<h4>Files:</h4><ul>");
            for file in files {
                html.push_str(&format!("<li>{}</li>", escape_html(file)));
            }
            html.push_str("</ul>\n");
        }

        Mail {
            subject: format!("Merge conflict in \"{}\"", self.repository),
            html,
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
