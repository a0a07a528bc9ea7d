//! Hop execution.
//!
//! One hop fetches, refreshes the two local branches, merges `upstream` into
//! `head` and pushes `head`. The executor never retries; recovery policy
//! belongs to the orchestrator.

pub mod executor;
pub mod outcome;

pub use executor::HopExecutor;
pub use outcome::{HopOutcome, HopStep};

/// Derives the local branch name from a ref by dropping everything up to
/// and including `<remote>/` (or `heads/` when the remote is absent).
///
/// `origin/release/1.0` becomes `release/1.0`, `refs/heads/develop` becomes
/// `develop`; names without either marker are returned unchanged.
#[must_use]
pub fn local_branch_name(reference: &str, remote: &str) -> String {
    let remote_marker = format!("{remote}/");
    let marker = if reference.contains(&remote_marker) {
        remote_marker.as_str()
    } else {
        "heads/"
    };
    match reference.find(marker) {
        Some(index) => reference[index + marker.len()..].to_string(),
        None => reference.to_string(),
    }
}
