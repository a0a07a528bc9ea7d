//! `git` command-line adapter.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{RemoteOptions, VcsError, VersionControl};

const TOKEN_ENV: &str = "GITSYNC_GIT_TOKEN";

/// Answers git's credential requests from the child's environment so the
/// token never shows up in argv or on disk.
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { test \"$1\" = get && echo \"username=${GITSYNC_GIT_TOKEN}\" && echo \"password=x-oauth-basic\"; }; f";

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    /// Uses `git` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Uses a specific git executable.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, dir: Option<&Path>, options: Option<&RemoteOptions>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(token) = options.and_then(|o| o.credential.as_ref()) {
            cmd.args(["-c", "credential.helper=", "-c", CREDENTIAL_HELPER])
                .env(TOKEN_ENV, token.expose_secret());
        }
        cmd
    }

    async fn output<I, S>(
        &self,
        dir: Option<&Path>,
        options: Option<&RemoteOptions>,
        args: I,
    ) -> Result<Output, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(dir, options);
        cmd.args(args);
        Ok(cmd.output().await?)
    }

    /// Runs git in `dir` and returns trimmed stdout, failing on a non-zero exit.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(Some(dir), None, args).await?;
        checked(args, output)
    }

    async fn run_remote(
        &self,
        dir: Option<&Path>,
        options: &RemoteOptions,
        args: &[&str],
    ) -> Result<String, VcsError> {
        let output = self.output(dir, Some(options), args).await?;
        checked(args, output)
    }

    async fn ref_exists(&self, dir: &Path, reference: &str) -> Result<bool, VcsError> {
        let output = self
            .output(Some(dir), None, ["rev-parse", "--verify", "--quiet", reference])
            .await?;
        Ok(output.status.success())
    }

    async fn current_branch(&self, dir: &Path) -> Result<Option<String>, VcsError> {
        let output = self
            .output(Some(dir), None, ["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        if output.status.success() {
            Ok(Some(stdout(&output)))
        } else {
            Ok(None)
        }
    }

    async fn is_ancestor(&self, dir: &Path, ancestor: &str, of: &str) -> Result<bool, VcsError> {
        let args = ["merge-base", "--is-ancestor", ancestor, of];
        let output = self.output(Some(dir), None, args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_error(&args, &output)),
        }
    }

    /// Merges `target` into the checked-out branch; on failure collects the
    /// unmerged paths and restores the pre-merge state.
    async fn merge_checked_out(&self, dir: &Path, target: &str) -> Result<(), VcsError> {
        let args = ["merge", "--no-edit", target];
        let output = self.output(Some(dir), None, args).await?;
        if output.status.success() {
            return Ok(());
        }

        let unmerged = self
            .run(dir, &["diff", "--name-only", "--diff-filter=U"])
            .await
            .map(|out| lines(&out))
            .unwrap_or_default();

        if let Err(e) = self.run(dir, &["merge", "--abort"]).await {
            debug!(error = %e, "merge --abort after failed merge");
        }

        if unmerged.is_empty() {
            Err(command_error(&args, &output))
        } else {
            Err(VcsError::Conflict { paths: unmerged })
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn open(&self, path: &Path) -> Result<(), VcsError> {
        if !tokio::fs::try_exists(path).await? {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        self.run(path, &["rev-parse", "--git-dir"])
            .await
            .map(|_| ())
            .map_err(|_| VcsError::NotARepository(path.to_path_buf()))
    }

    #[instrument(skip(self, options))]
    async fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let target = path.to_string_lossy();
        self.run_remote(None, options, &["clone", "--origin", remote, "--", url, &target])
            .await
            .map(|_| ())
    }

    async fn has_remote(&self, path: &Path, remote: &str) -> Result<bool, VcsError> {
        let out = self.run(path, &["remote"]).await?;
        Ok(lines(&out).iter().any(|name| name == remote))
    }

    async fn remove_working_copy(&self, path: &Path) -> Result<(), VcsError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_config(&self, path: &Path, key: &str, value: &str) -> Result<(), VcsError> {
        self.run(path, &["config", "--local", key, value])
            .await
            .map(|_| ())
    }

    async fn remote_branches(&self, path: &Path, remote: &str) -> Result<Vec<String>, VcsError> {
        let prefix = format!("refs/remotes/{remote}/");
        let out = self
            .run(path, &["for-each-ref", "--format=%(refname)", &prefix])
            .await?;
        Ok(lines(&out)
            .into_iter()
            .filter(|name| !name.ends_with("/HEAD"))
            .collect())
    }

    #[instrument(skip(self, options))]
    async fn fetch(
        &self,
        path: &Path,
        remote: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        let mut args = vec!["fetch"];
        if options.prune {
            args.push("--prune");
        }
        if options.tags {
            args.push("--tags");
        }
        args.push(remote);
        self.run_remote(Some(path), options, &args).await.map(|_| ())
    }

    async fn submodules(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        if !tokio::fs::try_exists(path.join(".gitmodules")).await? {
            return Ok(Vec::new());
        }
        let args = [
            "config",
            "--file",
            ".gitmodules",
            "--get-regexp",
            r"^submodule\..*\.path$",
        ];
        let output = self.output(Some(path), None, args).await?;
        match output.status.code() {
            Some(0) => Ok(lines(&stdout(&output))
                .iter()
                .filter_map(|line| line.split_once(' ').map(|(_, p)| p.to_string()))
                .collect()),
            // --get-regexp exits with 1 when nothing matches.
            Some(1) => Ok(Vec::new()),
            _ => Err(command_error(&args, &output)),
        }
    }

    async fn update_submodule(
        &self,
        path: &Path,
        submodule: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        self.run(path, &["submodule", "init", "--", submodule]).await?;
        self.run_remote(Some(path), options, &["submodule", "update", "--", submodule])
            .await
            .map(|_| ())
    }

    async fn resolve_ref(&self, path: &Path, reference: &str) -> Result<String, VcsError> {
        let out = self
            .run(
                path,
                &["for-each-ref", "--format=%(refname) %(refname:short)", reference],
            )
            .await?;
        lines(&out)
            .iter()
            .find_map(|line| {
                let (full, short) = line.split_once(' ')?;
                (full == reference).then(|| short.to_string())
            })
            .ok_or_else(|| VcsError::NotFound(reference.to_string()))
    }

    #[instrument(skip(self))]
    async fn pull_branch(
        &self,
        path: &Path,
        local: &str,
        remote_ref: &str,
    ) -> Result<(), VcsError> {
        let local_ref = format!("refs/heads/{local}");
        if !self.ref_exists(path, &local_ref).await? {
            debug!(local, remote_ref, "Creating local branch");
            return self.run(path, &["branch", local, remote_ref]).await.map(|_| ());
        }

        if self.is_ancestor(path, remote_ref, &local_ref).await? {
            debug!(local, remote_ref, "Local branch already up to date");
            return Ok(());
        }

        if self.current_branch(path).await?.as_deref() == Some(local) {
            return self.merge_checked_out(path, remote_ref).await;
        }

        if self.is_ancestor(path, &local_ref, remote_ref).await? {
            let args = ["branch", "-f", local, remote_ref];
            let output = self.output(Some(path), None, args).await?;
            if output.status.success() {
                return Ok(());
            }
            let err = command_error(&args, &output);
            if stderr(&output).contains("checked out") {
                warn!(local, "Fast-forward refused, branch is checked out");
                return Err(VcsError::BranchCheckedOut(local.to_string()));
            }
            return Err(err);
        }

        self.run(path, &["checkout", local]).await?;
        self.merge_checked_out(path, remote_ref).await
    }

    #[instrument(skip(self))]
    async fn merge(&self, path: &Path, head: &str, upstream: &str) -> Result<String, VcsError> {
        self.run(path, &["checkout", head]).await?;
        self.merge_checked_out(path, upstream).await?;
        self.run(path, &["rev-parse", "HEAD"]).await
    }

    #[instrument(skip(self, options))]
    async fn push(
        &self,
        path: &Path,
        remote: &str,
        branch: &str,
        options: &RemoteOptions,
    ) -> Result<(), VcsError> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.run_remote(Some(path), options, &["push", remote, &refspec])
            .await
            .map(|_| ())
    }
}

fn checked(args: &[&str], output: Output) -> Result<String, VcsError> {
    if output.status.success() {
        Ok(stdout(&output))
    } else {
        Err(command_error(args, &output))
    }
}

fn command_error(args: &[&str], output: &Output) -> VcsError {
    VcsError::Command {
        command: args.first().copied().unwrap_or_default().to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: stderr(output),
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_skips_blank_entries() {
        assert_eq!(
            lines("refs/remotes/origin/a\n\n  refs/remotes/origin/b  \n"),
            vec!["refs/remotes/origin/a", "refs/remotes/origin/b"]
        );
    }

    #[tokio::test]
    async fn open_rejects_missing_path() {
        let git = GitCli::new();
        let err = git
            .open(Path::new("/definitely/not/a/repository"))
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::NotARepository(_)));
    }

    #[tokio::test]
    async fn removing_missing_working_copy_is_ok() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        GitCli::new()
            .remove_working_copy(&dir.path().join("gone"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn has_remote_lists_configured_remotes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let git = GitCli::new();
        let Ok(init) = git.output(Some(dir.path()), None, ["init", "--quiet"]).await else {
            return Ok(());
        };
        if !init.status.success() {
            return Ok(());
        }
        git.run(dir.path(), &["remote", "add", "upstream", "https://example.com/r.git"])
            .await?;

        assert!(git.has_remote(dir.path(), "upstream").await?);
        assert!(!git.has_remote(dir.path(), "origin").await?);
        Ok(())
    }
}

