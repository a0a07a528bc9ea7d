//! Branch-chain synchronization.
//!
//! Keeps a linear chain of branches (e.g. `sandbox` → `preview` →
//! `release/1.x` → `develop`) in sync: when a branch advances, its changes
//! cascade one hop at a time into the next branch downstream.
//!
//! - [`chain`] derives the ordered chain and its hops from branch rules.
//! - [`queue`] runs jobs strictly one at a time, in submission order.
//! - [`hop`] executes one hop against a working copy.
//! - [`orchestrator`] maps pushes to jobs and handles failures.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Branch rules, chain resolution and hop pairs.
pub mod chain;
/// Conflict escalation via pull requests and mail.
pub mod escalation;
/// The per-hop merge protocol.
pub mod hop;
/// Infrastructure components (config, server, telemetry).
pub mod infrastructure;
/// Push handling and failure policies.
pub mod orchestrator;
/// Serializing job queue.
pub mod queue;
/// Managed repository definitions.
pub mod repository;
/// Version-control contract and the git adapter.
pub mod vcs;
/// Inbound GitHub webhook.
pub mod webhook;
