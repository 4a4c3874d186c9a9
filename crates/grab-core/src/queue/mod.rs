//! Thread-safe priority queue of pending jobs.
//!
//! Jobs are served in ascending priority order; equal priorities are served
//! in enqueue order (a sequence number breaks ties). The queue is unbounded.
//! Besides pending jobs it counts *unfinished* jobs (pending plus in flight)
//! so callers can wait for a full drain, not just an empty heap.

mod job;
mod priority;
mod scope;

pub use job::{Job, JobFn};
pub use priority::Priority;
pub use scope::{JobScope, ScopeTicket};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

struct QueuedJob {
    job: Job,
    sequence: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element: invert both keys so the
        // lowest priority value, then the oldest sequence, comes out first.
        other
            .job
            .priority
            .cmp(&self.job.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_sequence: u64,
    /// Pending plus in-flight jobs.
    unfinished: usize,
    closed: bool,
}

#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    /// Signalled when a job is pushed or the queue is closed.
    ready: Condvar,
    /// Signalled when `unfinished` reaches zero.
    drained: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a job. Never blocks; fails only once the queue is closed.
    pub fn put(&self, job: Job) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ShutDown);
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.unfinished += 1;
        state.heap.push(QueuedJob { job, sequence });
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocks until a job is available. Returns `None` once the queue is
    /// closed and no pending jobs remain.
    pub fn get(&self) -> Option<Job> {
        let mut state = self.lock();
        loop {
            if let Some(queued) = state.heap.pop() {
                return Some(queued.job);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking variant of [`get`](Self::get).
    pub fn try_get(&self) -> Option<Job> {
        self.lock().heap.pop().map(|q| q.job)
    }

    /// Marks one job handed out by `get` as finished.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.drained.notify_all();
        }
    }

    /// Waits until every enqueued job has been handed out *and* marked done.
    /// The condition is re-checked after every wake-up, so a job enqueued
    /// while waiting extends the wait. Returns whether the queue drained
    /// within `timeout` (`None` waits forever, zero only polls).
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        while state.unfinished > 0 {
            state = match deadline {
                None => self
                    .drained
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.drained
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }

    /// Stops accepting jobs. Pending jobs are still handed out; blocked
    /// `get` calls return `None` once the heap is empty.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Jobs waiting to be picked up.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jobs waiting plus jobs currently executing.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("JobQueue")
            .field("pending", &state.heap.len())
            .field("unfinished", &state.unfinished)
            .field("closed", &state.closed)
            .finish()
    }
}
