//! A bounded worker pool for scheduling-request jobs (`spec.md` §5):
//! evicts the oldest running job to make room for a new one, enforces a
//! per-job timeout, and notifies callers via a done callback.
//!
//! Grounded on `original_source/scheduler/process_manager/manager.py` /
//! `runner.py` (`ProcessManager`/`StandardRunner`): the original forks OS
//! processes and calls `StandardRunner.evict`/`schedule` to bound
//! concurrency; here each job is a spawned `tokio` task instead of a
//! `multiprocessing.Process`, but the evict-oldest-when-full policy and
//! per-job timeout are the same.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How a submitted job ended, handed to the job's done callback.
#[derive(Debug)]
pub enum JobOutcome<T> {
    Done(T),
    TimedOut,
}

/// Bounded pool of concurrently running jobs. Mirrors `StandardRunner`'s
/// `max_jobs`/`jobs` fields; `evict` corresponds to dropping the oldest
/// entry from the front of the queue rather than the original's `jobs[-1]`,
/// since this pool tracks jobs in submission order and evicts the
/// longest-running one to make room, not the most recent.
pub struct WorkerPool {
    max_jobs: usize,
    timeout: Duration,
    jobs: Mutex<VecDeque<JoinHandle<()>>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(max_jobs: usize, timeout: Duration) -> Self {
        Self { max_jobs, timeout, jobs: Mutex::new(VecDeque::new()) }
    }

    /// Attempts to schedule `work`. If the pool is already at capacity, the
    /// oldest running job is evicted first (`runner.py`'s
    /// `schedule`/`evict`). `done` runs once `work` finishes or its
    /// `timeout` elapses; it does not run for a job this call evicts, since
    /// an evicted job's task is aborted mid-flight.
    pub fn schedule<F, T>(&self, work: F, done: impl FnOnce(JobOutcome<T>) + Send + 'static)
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        {
            let mut jobs = self.jobs.lock().expect("lock poisoned");
            if jobs.len() >= self.max_jobs {
                if let Some(oldest) = jobs.pop_front() {
                    oldest.abort();
                    log::info!("worker pool full ({} jobs), evicted oldest job", self.max_jobs);
                }
            }
        }

        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, work).await {
                Ok(result) => done(JobOutcome::Done(result)),
                Err(_) => {
                    log::warn!("worker pool job timed out after {timeout:?}");
                    done(JobOutcome::TimedOut);
                }
            }
        });

        self.jobs.lock().expect("lock poisoned").push_back(handle);
    }

    /// Drops handles for jobs that have already finished, so `len` reflects
    /// current occupancy rather than peak submissions.
    pub fn reap_finished(&self) {
        self.jobs.lock().expect("lock poisoned").retain(|h| !h.is_finished());
    }

    #[must_use]
    pub fn len(&self) -> usize { self.jobs.lock().expect("lock poisoned").len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Aborts every running job (`StandardRunner.terminate_all`).
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        for job in jobs.drain(..) {
            job.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn schedule_runs_work_and_invokes_done() {
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.schedule(async { 42 }, move |outcome| {
            let _ = tx.send(outcome);
        });

        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, JobOutcome::Done(42)));
    }

    #[tokio::test]
    async fn job_exceeding_timeout_reports_timed_out() {
        let pool = WorkerPool::new(2, Duration::from_millis(20));
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.schedule(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
            move |outcome: JobOutcome<()>| {
                let _ = tx.send(outcome);
            },
        );

        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, JobOutcome::TimedOut));
    }

    #[tokio::test]
    async fn scheduling_past_capacity_evicts_the_oldest_job() {
        let pool = Arc::new(WorkerPool::new(1, Duration::from_secs(5)));
        let done_count = Arc::new(AtomicUsize::new(0));

        let first_started = Arc::new(tokio::sync::Notify::new());
        let first_started_clone = first_started.clone();
        pool.schedule(
            async move {
                first_started_clone.notify_one();
                tokio::time::sleep(Duration::from_secs(30)).await;
            },
            {
                let done_count = done_count.clone();
                move |_: JobOutcome<()>| {
                    done_count.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        first_started.notified().await;

        assert_eq!(pool.len(), 1);
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.schedule(async { "second" }, move |outcome| {
            let _ = tx.send(outcome);
        });

        // The evicted first job's callback never runs; only capacity bookkeeping
        // is observable here, plus the second job still completing normally.
        assert_eq!(pool.len(), 1);
        assert!(matches!(rx.await.unwrap(), JobOutcome::Done("second")));
    }
}
