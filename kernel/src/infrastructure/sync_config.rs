//! Loading of the YAML sync config.
//!
//! ```yaml
//! git_config:
//!   - user.name: git-synced
//!   - user.email: sync@example.com
//! repositories:
//!   - widgets:
//!     remote_url: https://github.com/acme/widgets.git
//!     local_path: ./repos/widgets
//!     submodule: false
//!     branches:
//!       - sandbox
//!       - release:
//!         regex: /release\//
//!         sort: semver
//!       - develop
//! ```
//!
//! The raw YAML shape never leaves this module: branch rules are normalized
//! into [`BranchRule`] records and paths are made absolute.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::chain::{BranchMatcher, BranchRule, ChainError, SortOrder};
use crate::repository::{GitConfigEntry, RepositoryConfig, DEFAULT_REMOTE};

/// Errors raised while loading the sync config.
#[derive(Debug, Error)]
pub enum SyncConfigError {
    /// The file does not exist.
    #[error("No sync config found at path {0}")]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid YAML or does not have the expected shape.
    #[error("Malformed sync config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A repository entry has no name.
    #[error("Repository entry #{0} has no name")]
    MissingName(usize),
    /// Two repository entries share a name.
    #[error("Repository \"{0}\" is configured more than once")]
    DuplicateName(String),
    /// A branch rule could not be built.
    #[error("Invalid branch rule in repository \"{repository}\": {source}")]
    InvalidRule {
        /// Repository the rule belongs to.
        repository: String,
        /// Underlying error.
        source: ChainError,
    },
    /// A branch or git config entry has an unsupported shape.
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

/// Normalized sync config.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Managed repositories in declared order.
    pub repositories: Vec<RepositoryConfig>,
    /// Git config applied after every clone, in declared order.
    pub git_config: Vec<GitConfigEntry>,
}

#[derive(Debug, Deserialize)]
struct RawSyncConfig {
    #[serde(default)]
    git_config: Vec<Mapping>,
    #[serde(default)]
    repositories: Vec<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: Option<String>,
    remote_url: String,
    remote_name: Option<String>,
    local_path: PathBuf,
    #[serde(default)]
    submodule: bool,
    #[serde(default)]
    branches: Vec<Value>,
    #[serde(flatten)]
    rest: Mapping,
}

impl SyncConfig {
    /// Reads and normalizes the config at `path`. Relative `local_path`
    /// values resolve against the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, or if its
    /// content is invalid.
    pub fn load(path: &Path) -> Result<Self, SyncConfigError> {
        if !path.exists() {
            return Err(SyncConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| SyncConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let base = std::path::absolute(&base).map_err(|source| SyncConfigError::Read {
            path: base.clone(),
            source,
        })?;

        let config = Self::from_yaml(&text, &base)?;
        info!(
            path = %path.display(),
            repositories = config.repositories.len(),
            git_config = config.git_config.len(),
            "Sync config loaded"
        );
        Ok(config)
    }

    /// Parses YAML text, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn from_yaml(text: &str, base_dir: &Path) -> Result<Self, SyncConfigError> {
        let raw: RawSyncConfig = serde_yaml::from_str(text)?;

        let git_config = raw
            .git_config
            .iter()
            .map(parse_git_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut repositories = Vec::with_capacity(raw.repositories.len());
        for (index, repo) in raw.repositories.into_iter().enumerate() {
            let repo = normalize_repository(index, repo, base_dir)?;
            if !seen.insert(repo.name.clone()) {
                return Err(SyncConfigError::DuplicateName(repo.name));
            }
            repositories.push(repo);
        }

        Ok(Self {
            repositories,
            git_config,
        })
    }

    /// Looks a repository up by name.
    #[must_use]
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }
}

/// The key of a YAML mapping whose value is null (`- widgets:`).
fn null_key(map: &Mapping) -> Option<String> {
    map.iter().find_map(|(k, v)| match (k, v) {
        (Value::String(k), Value::Null) => Some(k.clone()),
        _ => None,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_git_config(entry: &Mapping) -> Result<GitConfigEntry, SyncConfigError> {
    let mut iter = entry.iter();
    match (iter.next(), iter.next()) {
        (Some((Value::String(key), value)), None) => scalar_to_string(value)
            .map(|value| GitConfigEntry::new(key.clone(), value))
            .ok_or_else(|| SyncConfigError::InvalidEntry(format!("git_config \"{key}\" needs a scalar value"))),
        _ => Err(SyncConfigError::InvalidEntry(
            "git_config entries must have exactly one key".into(),
        )),
    }
}

fn normalize_repository(
    index: usize,
    raw: RawRepository,
    base_dir: &Path,
) -> Result<RepositoryConfig, SyncConfigError> {
    let name = raw
        .name
        .or_else(|| null_key(&raw.rest))
        .filter(|n| !n.trim().is_empty())
        .ok_or(SyncConfigError::MissingName(index))?;

    let branch_rules = raw
        .branches
        .iter()
        .map(|spec| parse_branch_rule(&name, spec))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RepositoryConfig {
        remote_url: raw.remote_url,
        remote_name: raw.remote_name.unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        local_path: base_dir.join(raw.local_path),
        branch_rules,
        submodule: raw.submodule,
        name,
    })
}

fn parse_branch_rule(repository: &str, spec: &Value) -> Result<BranchRule, SyncConfigError> {
    let invalid_rule = |source| SyncConfigError::InvalidRule {
        repository: repository.to_string(),
        source,
    };

    match spec {
        Value::String(name) => BranchRule::literal(name.clone()).map_err(invalid_rule),
        Value::Mapping(map) => {
            let name = null_key(map).ok_or_else(|| {
                SyncConfigError::InvalidEntry(format!(
                    "branch rule in \"{repository}\" has no name key"
                ))
            })?;
            let matcher = match map.get("regex").and_then(Value::as_str) {
                Some(pattern) => BranchMatcher::pattern(pattern),
                None => BranchMatcher::literal(&name),
            }
            .map_err(invalid_rule)?;
            let order = match map.get("sort").and_then(Value::as_str) {
                Some("semver") => SortOrder::Semver,
                _ => SortOrder::Alphabetical,
            };
            Ok(BranchRule::new(name, matcher, order))
        }
        other => Err(SyncConfigError::InvalidEntry(format!(
            "unsupported branch rule in \"{repository}\": {other:?}"
        ))),
    }
}
