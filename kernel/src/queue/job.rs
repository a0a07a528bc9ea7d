//! Jobs and their completion handles.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::QueueError;

type Executor = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// How a submitted job settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The job ran to completion.
    Processed,
    /// The job ran and returned an error.
    Failed(String),
    /// The job was removed from the pending list before it started.
    Canceled,
}

impl JobStatus {
    /// Returns `true` if the job was canceled rather than executed.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// A unit of work: consumed exactly once, either executed or canceled.
pub struct Job {
    pub(super) id: Uuid,
    pub(super) label: String,
    pub(super) execute: Executor,
}

impl Job {
    /// Creates a job from a label and a deferred computation.
    pub fn new<F, Fut>(label: impl Into<String>, execute: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            execute: Box::new(move || execute().boxed()),
        }
    }

    /// Starts building a job with the given label.
    #[must_use]
    pub fn builder(label: impl Into<String>) -> JobBuilder {
        JobBuilder {
            label: label.into(),
            execute: None,
        }
    }

    /// Job identifier used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Label used for selective cancellation.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Job`]; refuses to build without an executable body.
pub struct JobBuilder {
    label: String,
    execute: Option<Executor>,
}

impl JobBuilder {
    /// Sets the deferred computation.
    #[must_use]
    pub fn execute<F, Fut>(mut self, execute: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.execute = Some(Box::new(move || execute().boxed()));
        self
    }

    /// Finishes the job.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MissingExecutor` if no body was set.
    pub fn build(self) -> Result<Job, QueueError> {
        let execute = self
            .execute
            .ok_or_else(|| QueueError::MissingExecutor(self.label.clone()))?;
        Ok(Job {
            id: Uuid::new_v4(),
            label: self.label,
            execute,
        })
    }
}

/// Completion side of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    label: String,
    done: oneshot::Receiver<JobStatus>,
}

impl JobHandle {
    pub(super) fn new(id: Uuid, label: String, done: oneshot::Receiver<JobStatus>) -> Self {
        Self { id, label, done }
    }

    /// Job identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Job label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Waits until the job settles. A job dropped together with its queue
    /// counts as canceled.
    pub async fn settled(self) -> JobStatus {
        self.done.await.unwrap_or(JobStatus::Canceled)
    }
}
