//! Per-task outstanding-job tracking.
//!
//! A scope counts jobs that were enqueued on behalf of one task and have not
//! finished yet, so a task can wait for its own work without waiting for
//! every other task sharing the manager.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct ScopeState {
    pending: Mutex<usize>,
    idle: Condvar,
}

#[derive(Clone, Default)]
pub struct JobScope {
    state: Arc<ScopeState>,
}

impl JobScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more outstanding job; the count drops when the ticket is dropped.
    pub fn ticket(&self) -> ScopeTicket {
        *self.lock() += 1;
        ScopeTicket {
            state: Arc::clone(&self.state),
        }
    }

    pub fn pending(&self) -> usize {
        *self.lock()
    }

    /// Blocks until no tickets are outstanding or `timeout` expires. Returns
    /// whether the scope was idle. `None` waits forever, a zero timeout only polls.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = self.lock();
        while *pending > 0 {
            pending = match deadline {
                None => self
                    .state
                    .idle
                    .wait(pending)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.state
                        .idle
                        .wait_timeout(pending, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for JobScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScope")
            .field("pending", &self.pending())
            .finish()
    }
}

/// One outstanding job of a scope. Released on drop, whether the job ran,
/// failed, panicked or was discarded.
pub struct ScopeTicket {
    state: Arc<ScopeState>,
}

impl Drop for ScopeTicket {
    fn drop(&mut self) {
        let mut pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.state.idle.notify_all();
        }
    }
}
