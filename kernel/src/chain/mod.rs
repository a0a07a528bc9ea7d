//! Branch chain resolution.
//!
//! A repository's branch rules turn the set of remote branch names into an
//! ordered chain; adjacent chain elements form the hops that get merged
//! downstream one at a time.

pub mod resolver;
pub mod rules;

pub use resolver::{hop_pairs, resolve_chain, ChainError, HopPair};
pub use rules::{BranchMatcher, BranchRule, SortOrder};
