//! Serializing job queue.
//!
//! Jobs run strictly one at a time in submission order across the whole
//! queue instance. Jobs that have not started yet can be canceled by label.

pub mod job;
pub mod worker;

pub use job::{Job, JobBuilder, JobHandle, JobStatus};
pub use worker::JobQueue;

/// Errors raised synchronously by the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// A job was built without an executable body.
    #[error("Job '{0}' has no executable body")]
    MissingExecutor(String),
    /// The queue was stopped and accepts no more work.
    #[error("Queue is stopped")]
    Stopped,
}
