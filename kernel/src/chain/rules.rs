//! Normalized branch rules.
//!
//! Rules are parsed once from the sync config and never carry the raw YAML
//! shape into chain resolution.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

use super::resolver::ChainError;

/// How a rule decides whether a branch name belongs to it.
#[derive(Debug, Clone)]
pub enum BranchMatcher {
    /// Case-insensitive match of `<name>` or `<anything>/<name>`.
    Literal(Regex),
    /// Explicit, unanchored pattern from the config.
    Pattern(Regex),
}

impl BranchMatcher {
    /// Builds the literal matcher for a branch name.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::InvalidPattern` if the derived regex does not compile.
    pub fn literal(name: &str) -> Result<Self, ChainError> {
        let source = format!("(?i)^(.*/)?{}$", regex::escape(name));
        Regex::new(&source)
            .map(Self::Literal)
            .map_err(|e| ChainError::InvalidPattern {
                pattern: source,
                reason: e.to_string(),
            })
    }

    /// Builds a pattern matcher. A single pair of surrounding slashes
    /// (`/release\/.*/`) is stripped before compiling.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::InvalidPattern` if the pattern does not compile.
    pub fn pattern(raw: &str) -> Result<Self, ChainError> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        Regex::new(trimmed)
            .map(Self::Pattern)
            .map_err(|e| ChainError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Returns `true` if `branch` belongs to this matcher.
    #[must_use]
    pub fn is_match(&self, branch: &str) -> bool {
        match self {
            Self::Literal(re) | Self::Pattern(re) => re.is_match(branch),
        }
    }
}

/// Ordering applied to the branches a rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Plain lexicographic order.
    #[default]
    Alphabetical,
    /// Ascending by the version number in the last path segment.
    Semver,
}

impl SortOrder {
    /// Sorts `branches` in place.
    pub fn sort(self, branches: &mut [String]) {
        match self {
            Self::Alphabetical => branches.sort(),
            Self::Semver => branches.sort_by(|a, b| compare_versions(a, b)),
        }
    }
}

/// One entry of a repository's sync chain.
#[derive(Debug, Clone)]
pub struct BranchRule {
    /// Display key from the config.
    pub name: String,
    matcher: BranchMatcher,
    order: SortOrder,
}

impl BranchRule {
    /// Creates a rule from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, matcher: BranchMatcher, order: SortOrder) -> Self {
        Self {
            name: name.into(),
            matcher,
            order,
        }
    }

    /// Rule for a bare branch name, sorted alphabetically.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot be turned into a matcher.
    pub fn literal(name: impl Into<String>) -> Result<Self, ChainError> {
        let name = name.into();
        let matcher = BranchMatcher::literal(&name)?;
        Ok(Self::new(name, matcher, SortOrder::Alphabetical))
    }

    /// Returns `true` if `branch` is covered by this rule.
    #[must_use]
    pub fn matches(&self, branch: &str) -> bool {
        self.matcher.is_match(branch)
    }

    /// Returns the rule's sort order.
    #[must_use]
    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Returns the names from `branches` this rule matches, in rule order.
    #[must_use]
    pub fn select(&self, branches: &[String]) -> Vec<String> {
        let mut matched: Vec<String> = branches
            .iter()
            .filter(|b| self.matches(b))
            .cloned()
            .collect();
        self.order.sort(&mut matched);
        matched
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("version pattern is valid")
    })
}

/// Extracts `(major, minor, patch)` from the last path segment of a branch.
fn parse_version(branch: &str) -> Option<(u64, u64, u64)> {
    let segment = branch.rsplit('/').next().unwrap_or(branch);
    let caps = version_regex().captures(segment)?;
    let part = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    Some((part(1), part(2), part(3)))
}

/// Versioned names sort before unversioned ones; ties fall back to the name.
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
