//! Queue state and the driving loop.

use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{Job, JobHandle, JobStatus};
use super::QueueError;

struct Pending {
    job: Job,
    done: oneshot::Sender<JobStatus>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    in_flight: Option<(Uuid, String)>,
    stopped: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
}

/// Handle to a FIFO queue that executes one job at a time.
///
/// Cloning the handle shares the same queue. The driving loop is started
/// with [`JobQueue::start`] or by spawning [`JobQueue::run`].
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    /// Creates an idle queue. Nothing executes until [`JobQueue::run`] is driven.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
            }),
        }
    }

    /// Creates a queue and spawns its driving loop on the current runtime.
    #[must_use]
    pub fn start() -> (Self, JoinHandle<()>) {
        let queue = Self::new();
        let worker = tokio::spawn(queue.clone().run());
        (queue, worker)
    }

    /// Appends a job to the pending list.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Stopped` once [`JobQueue::stop`] was called.
    pub fn submit(&self, job: Job) -> Result<JobHandle, QueueError> {
        let (tx, rx) = oneshot::channel();
        let handle = JobHandle::new(job.id, job.label.clone(), rx);
        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return Err(QueueError::Stopped);
            }
            debug!(job_id = %job.id, label = %job.label, position = state.pending.len(), "Job queued");
            state.pending.push_back(Pending { job, done: tx });
            record_depth(state.pending.len());
        }
        metrics::counter!("gitsync_jobs_submitted_total").increment(1);
        self.shared.wake.notify_one();
        Ok(handle)
    }

    /// Removes every not-yet-started job carrying `label` and settles it as
    /// canceled. A job already in flight is left alone. Returns the number of
    /// canceled jobs.
    pub fn cancel_pending(&self, label: &str) -> usize {
        let canceled: Vec<Pending> = {
            let mut state = self.shared.state.lock();
            let (canceled, kept): (VecDeque<Pending>, VecDeque<Pending>) =
                state.pending.drain(..).partition(|p| p.job.label == label);
            state.pending = kept;
            record_depth(state.pending.len());
            canceled.into_iter().collect()
        };

        for pending in &canceled {
            debug!(job_id = %pending.job.id, label, "Pending job canceled");
        }
        let count = canceled.len();
        for pending in canceled {
            let _ = pending.done.send(JobStatus::Canceled);
        }
        if count > 0 {
            metrics::counter!("gitsync_jobs_canceled_total").increment(count as u64);
            info!(label, count, "Canceled pending jobs");
        }
        count
    }

    /// Stops dequeuing. A job in flight still runs to completion; pending
    /// jobs stay unsettled until the queue is dropped.
    pub fn stop(&self) {
        self.shared.state.lock().stopped = true;
        self.shared.wake.notify_one();
    }

    /// Number of jobs waiting to start.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Labels of the waiting jobs, in execution order.
    #[must_use]
    pub fn pending_labels(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .map(|p| p.job.label.clone())
            .collect()
    }

    /// Label of the job currently executing, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .in_flight
            .as_ref()
            .map(|(_, label)| label.clone())
    }

    /// Drives the queue until [`JobQueue::stop`] is called.
    ///
    /// Each job is awaited to completion before the next one is dequeued, so
    /// at most one job executes at any instant even when jobs suspend on I/O.
    pub async fn run(self) {
        info!("Job queue started");
        loop {
            let wake = self.shared.wake.notified();
            let next = {
                let mut state = self.shared.state.lock();
                if state.stopped {
                    break;
                }
                let next = state.pending.pop_front();
                if let Some(p) = &next {
                    state.in_flight = Some((p.job.id, p.job.label.clone()));
                    record_depth(state.pending.len());
                }
                next
            };

            let Some(Pending { job, done }) = next else {
                wake.await;
                continue;
            };

            let Job { id, label, execute } = job;
            debug!(job_id = %id, label = %label, "Job started");
            let status = match AssertUnwindSafe(execute()).catch_unwind().await {
                Ok(Ok(())) => JobStatus::Processed,
                Ok(Err(e)) => {
                    warn!(job_id = %id, label = %label, error = %e, "Job failed");
                    JobStatus::Failed(e.to_string())
                }
                Err(_) => {
                    warn!(job_id = %id, label = %label, "Job panicked");
                    JobStatus::Failed("job panicked".to_string())
                }
            };

            self.shared.state.lock().in_flight = None;
            debug!(job_id = %id, label = %label, ?status, "Job settled");
            let _ = done.send(status);

            tokio::task::yield_now().await;
        }
        info!("Job queue stopped");
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_depth(depth: usize) {
    metrics::gauge!("gitsync_queue_pending").set(depth as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording_job(label: &str, name: &str, log: &Log, delay_ms: u64) -> Job {
        let log = Arc::clone(log);
        let name = name.to_string();
        Job::new(label, move || async move {
            log.lock().push(format!("start {name}"));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().push(format!("end {name}"));
            Ok(())
        })
    }

    #[tokio::test]
    async fn single_job_is_processed() -> anyhow::Result<()> {
        let (queue, _worker) = JobQueue::start();
        let log = Log::default();
        let handle = queue.submit(recording_job("r", "j0", &log, 0))?;
        assert_eq!(handle.settled().await, JobStatus::Processed);
        assert_eq!(*log.lock(), vec!["start j0", "end j0"]);
        Ok(())
    }

    #[tokio::test]
    async fn jobs_run_one_at_a_time_in_submission_order() -> anyhow::Result<()> {
        let (queue, _worker) = JobQueue::start();
        let log = Log::default();
        let mut handles = Vec::new();
        for i in 0..5u64 {
            // Earlier jobs sleep longer so any overlap would reorder the log.
            let label = if i % 2 == 0 { "a" } else { "b" };
            handles.push(queue.submit(recording_job(label, &format!("j{i}"), &log, 25 - i * 5))?);
        }
        for handle in handles {
            assert_eq!(handle.settled().await, JobStatus::Processed);
        }

        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start j{i}"), format!("end j{i}")])
            .collect();
        assert_eq!(*log.lock(), expected);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_pending_only_touches_matching_label() -> anyhow::Result<()> {
        let (queue, _worker) = JobQueue::start();
        let log = Log::default();
        let (release, gate) = oneshot::channel::<()>();

        let blocker_log = Arc::clone(&log);
        let blocker = queue.submit(Job::new("r", move || async move {
            blocker_log.lock().push("start blocker".into());
            let _ = gate.await;
            blocker_log.lock().push("end blocker".into());
            Ok(())
        }))?;

        while queue.in_flight().is_none() {
            tokio::task::yield_now().await;
        }

        let r1 = queue.submit(recording_job("r", "r1", &log, 0))?;
        let s1 = queue.submit(recording_job("s", "s1", &log, 0))?;
        let r2 = queue.submit(recording_job("r", "r2", &log, 0))?;
        assert_eq!(queue.pending_labels(), vec!["r", "s", "r"]);

        assert_eq!(queue.cancel_pending("r"), 2);
        assert_eq!(queue.pending_labels(), vec!["s"]);
        assert_eq!(queue.in_flight().as_deref(), Some("r"));

        let _ = release.send(());
        assert_eq!(blocker.settled().await, JobStatus::Processed);
        assert!(r1.settled().await.is_canceled());
        assert!(r2.settled().await.is_canceled());
        assert_eq!(s1.settled().await, JobStatus::Processed);

        assert_eq!(
            *log.lock(),
            vec!["start blocker", "end blocker", "start s1", "end s1"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancel_with_unknown_label_is_noop() -> anyhow::Result<()> {
        let queue = JobQueue::new();
        let log = Log::default();
        let _h = queue.submit(recording_job("a", "a1", &log, 0))?;
        assert_eq!(queue.cancel_pending("b"), 0);
        assert_eq!(queue.pending_len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_the_loop() -> anyhow::Result<()> {
        let (queue, _worker) = JobQueue::start();
        let log = Log::default();
        let failing = queue.submit(Job::new("r", || async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        }))?;
        let next = queue.submit(recording_job("r", "after", &log, 0))?;

        assert_eq!(failing.settled().await, JobStatus::Failed("boom".to_string()));
        assert_eq!(next.settled().await, JobStatus::Processed);
        Ok(())
    }

    #[tokio::test]
    async fn panicking_job_is_reported_as_failed() -> anyhow::Result<()> {
        let (queue, _worker) = JobQueue::start();
        let explode = true;
        let panicking = queue.submit(Job::new("r", move || async move {
            assert!(!explode, "boom");
            Ok(())
        }))?;
        assert!(matches!(panicking.settled().await, JobStatus::Failed(_)));

        let log = Log::default();
        let next = queue.submit(recording_job("r", "after", &log, 0))?;
        assert_eq!(next.settled().await, JobStatus::Processed);
        Ok(())
    }

    #[tokio::test]
    async fn stop_lets_in_flight_job_finish() -> anyhow::Result<()> {
        let (queue, worker) = JobQueue::start();
        let log = Log::default();
        let (release, gate) = oneshot::channel::<()>();

        let in_flight_log = Arc::clone(&log);
        let first = queue.submit(Job::new("r", move || async move {
            let _ = gate.await;
            in_flight_log.lock().push("first done".into());
            Ok(())
        }))?;
        while queue.in_flight().is_none() {
            tokio::task::yield_now().await;
        }
        let _second = queue.submit(recording_job("r", "second", &log, 0))?;

        queue.stop();
        assert_eq!(
            queue.submit(recording_job("r", "late", &log, 0)).unwrap_err(),
            QueueError::Stopped
        );

        let _ = release.send(());
        assert_eq!(first.settled().await, JobStatus::Processed);
        worker.await?;

        assert_eq!(*log.lock(), vec!["first done"]);
        assert_eq!(queue.pending_len(), 1);
        Ok(())
    }
}
