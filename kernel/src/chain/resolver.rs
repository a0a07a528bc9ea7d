//! Chain and hop computation.
//!
//! Both functions are pure: the same inputs always produce the same output,
//! which keeps the start-up resync idempotent.

use std::collections::HashSet;
use std::fmt;

use super::rules::BranchRule;

/// Errors produced while resolving a chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The requested starting branch is not part of the chain.
    #[error("Branch \"{0}\" not found")]
    NotFound(String),
    /// A branch rule pattern failed to compile.
    #[error("Invalid branch pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

/// Two chain-adjacent branches: merge `upstream` into `head`, then push `head`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HopPair {
    /// Branch whose changes flow downstream.
    pub upstream: String,
    /// Branch receiving the merge.
    pub head: String,
}

impl HopPair {
    /// Creates a pair.
    #[must_use]
    pub fn new(upstream: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            head: head.into(),
        }
    }
}

impl fmt::Display for HopPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.upstream, self.head)
    }
}

/// Orders `remote_branches` by the repository's rules.
///
/// Each rule selects and sorts its own branches; the results are concatenated
/// in rule order and de-duplicated, keeping the first occurrence.
#[must_use]
pub fn resolve_chain(remote_branches: &[String], rules: &[BranchRule]) -> Vec<String> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .flat_map(|rule| rule.select(remote_branches))
        .filter(|branch| seen.insert(branch.clone()))
        .collect()
}

/// Computes the hops of `chain`, starting at `start` (the chain head when
/// `None`) and emitting at most `max_hops` pairs (unbounded when `None`).
///
/// A chain of two branches is already a pair and is returned as such without
/// looking at `start` or `max_hops`; shorter chains yield no hops. Starting at
/// the chain tail yields no hops either.
///
/// # Errors
///
/// Returns `ChainError::NotFound` if `start` is not in a chain longer than two.
pub fn hop_pairs(
    chain: &[String],
    start: Option<&str>,
    max_hops: Option<usize>,
) -> Result<Vec<HopPair>, ChainError> {
    match chain {
        [] | [_] => return Ok(Vec::new()),
        [upstream, head] => return Ok(vec![HopPair::new(upstream, head)]),
        _ => {}
    }

    let start_index = match start {
        None => 0,
        Some(branch) => chain
            .iter()
            .position(|b| b == branch)
            .ok_or_else(|| ChainError::NotFound(branch.to_string()))?,
    };

    let last = chain.len() - 1;
    let end_index = max_hops.map_or(last, |n| last.min(start_index.saturating_add(n)));

    Ok((start_index..end_index)
        .filter_map(|i| Some(HopPair::new(chain.get(i)?, chain.get(i + 1)?)))
        .collect())
}
