//! Fixed-size pool of worker threads draining the job queue.
//!
//! Each worker loops: block on the queue, run the job inside an error
//! boundary, mark it done, release the job's scope ticket. A job that
//! returns an error or panics is logged with the worker id and the worker
//! moves on to the next job. Workers are never restarted; they exit when the
//! queue is closed and empty.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::{panic_message, Error, Result};
use crate::queue::{Job, JobQueue, ScopeTicket};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    alive: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns `size` workers (at least one) on `queue`.
    pub fn spawn(size: usize, queue: Arc<JobQueue>) -> Result<Self> {
        let size = size.max(1);
        let alive = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let worker_queue = Arc::clone(&queue);
            let guard = AliveGuard::new(id, Arc::clone(&alive));
            let handle = thread::Builder::new()
                .name(format!("grab-worker-{}", id))
                .spawn(move || {
                    let _guard = guard;
                    worker_loop(id, &worker_queue);
                });
            match handle {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // Let the workers already running wind down.
                    queue.close();
                    return Err(Error::Spawn(e));
                }
            }
        }
        tracing::debug!(workers = size, "worker pool started");
        Ok(Self { handles, alive })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers whose loop is still running.
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn is_worker_thread(&self, id: ThreadId) -> bool {
        self.handles.iter().any(|h| h.thread().id() == id)
    }

    /// Waits for every worker to exit. Only returns once the queue has been
    /// closed and drained. The calling thread is skipped if it is a worker.
    pub fn join(self) {
        let me = thread::current().id();
        for handle in self.handles {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("worker thread panicked outside the job boundary");
            }
        }
    }
}

fn worker_loop(id: usize, queue: &JobQueue) {
    while let Some(job) = queue.get() {
        let ticket = run_job(id, job);
        // A task whose scope is idle has no job left in `unfinished`.
        queue.task_done();
        drop(ticket);
    }
    tracing::debug!(worker = id, "queue closed, worker exiting");
}

fn run_job(worker: usize, job: Job) -> Option<ScopeTicket> {
    let Job {
        priority,
        label,
        callback,
        ticket,
    } = job;
    tracing::trace!(worker, job = %label, %priority, "job started");
    let outcome = panic::catch_unwind(AssertUnwindSafe(callback));
    let failed = |message: String| Error::JobExecution {
        worker,
        job: label.clone(),
        message,
    };
    match outcome {
        Ok(Ok(())) => tracing::trace!(worker, job = %label, "job finished"),
        Ok(Err(e)) => {
            let err = failed(format!("{:#}", e));
            tracing::warn!(worker, job = %label, %priority, "{}", err);
        }
        Err(payload) => {
            let err = failed(format!("panicked: {}", panic_message(payload.as_ref())));
            tracing::error!(worker, job = %label, %priority, "{}", err);
        }
    }
    ticket
}

/// Tracks live workers; logs when a worker leaves its loop by panicking.
struct AliveGuard {
    id: usize,
    alive: Arc<AtomicUsize>,
}

impl AliveGuard {
    fn new(id: usize, alive: Arc<AtomicUsize>) -> Self {
        alive.fetch_add(1, Ordering::AcqRel);
        Self { id, alive }
    }
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        let remaining = self.alive.fetch_sub(1, Ordering::AcqRel) - 1;
        if thread::panicking() {
            tracing::error!(
                worker = self.id,
                remaining,
                "worker died; pool capacity reduced"
            );
        }
    }
}
