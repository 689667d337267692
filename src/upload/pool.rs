//! Bounded worker pool with fail-fast cancellation.
//!
//! ```text
//!   jobs ──► Mutex<queue> ◄── pull ── worker 0 ─┐
//!                         ◄── pull ── worker 1 ─┼─► first error ─► cancel
//!                         ◄── pull ── worker N ─┘
//! ```
//!
//! Workers pull whole jobs from one shared queue, so a job is never split
//! and no job is handled twice. Completion order across workers is not
//! defined. The first failing job records its error and cancels the shared
//! token; idle workers stop pulling and busy workers abandon their job.

use std::future::Future;
use std::num::NonZeroUsize;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound on concurrent workers regardless of available cores.
pub const MAX_WORKERS: usize = 4;

pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// At least one worker is always used.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Sizes the pool as `min(available parallelism, MAX_WORKERS, jobs)`.
    pub fn for_jobs(jobs: usize) -> Self {
        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(available.min(MAX_WORKERS).min(jobs))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work` over every job and returns the first error, if any.
    ///
    /// Must be called from a multi-threaded tokio runtime.
    pub fn run<T, E, F, Fut>(&self, jobs: Vec<T>, work: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(T) -> Fut + Sync,
        Fut: Future<Output = Result<(), E>> + Send,
    {
        if jobs.is_empty() {
            return Ok(());
        }

        let queue = Mutex::new(jobs.into_iter());
        let cancel = CancellationToken::new();
        let first_error: std::sync::Mutex<Option<E>> = std::sync::Mutex::new(None);

        tokio_scoped::scope(|scope| {
            for worker in 0..self.workers {
                let queue = &queue;
                let cancel = &cancel;
                let first_error = &first_error;
                let work = &work;

                scope.spawn(async move {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let Some(job) = queue.lock().await.next() else {
                            break;
                        };

                        let outcome = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                debug!("Worker {} abandoning job after cancellation", worker);
                                break;
                            }
                            outcome = work(job) => outcome,
                        };

                        if let Err(e) = outcome {
                            {
                                let mut slot = first_error
                                    .lock()
                                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                                if slot.is_none() {
                                    *slot = Some(e);
                                }
                            }
                            cancel.cancel();
                            break;
                        }
                    }
                });
            }
        });

        let slot = first_error
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.map_or(Ok(()), Err)
    }
}
