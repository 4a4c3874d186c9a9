//! Tasks: one logical download job, possibly fanning out into many queued jobs.
//!
//! A plugin supplies the [`Task`] implementation; the engine wraps it in a
//! [`TaskHandle`] that owns the lifecycle (start, join, state) and hands the
//! task a [`TaskContext`] while `run` executes.

mod context;
mod handle;

pub use context::TaskContext;
pub use handle::{TaskHandle, TaskState};

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Behaviour a plugin provides for one claimed identifier.
///
/// `run` executes once on the task's own background thread. `progress` may
/// be called from any thread while `run` is executing, so any state it reads
/// must sit behind the task's own lock (see [`ProgressCell`]).
pub trait Task: Send + Sync + 'static {
    /// Short description used in logs, usually the identifier.
    fn name(&self) -> &str;

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()>;

    fn progress(&self) -> Progress;

    /// Base that relative URLs passed to the context are resolved against.
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Subdirectory of the manager's output dir this task writes into.
    fn output_subdir(&self) -> Option<&Path> {
        None
    }
}

/// Completion fraction in `[0, 1]` plus a free-form status line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Progress {
    pub fraction: f64,
    pub status: String,
}

impl Progress {
    /// Clamps `fraction` into `[0, 1]`; NaN becomes 0.
    pub fn new(fraction: f64, status: impl Into<String>) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        Self {
            fraction,
            status: status.into(),
        }
    }

    /// `done` out of `total`; an empty total counts as complete.
    pub fn ratio(done: u64, total: u64, status: impl Into<String>) -> Self {
        if total == 0 {
            return Self::new(1.0, status);
        }
        Self::new(done as f64 / total as f64, status)
    }

    pub fn percent(&self) -> u32 {
        (self.fraction * 100.0).round() as u32
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% -- {}", self.percent(), self.status)
    }
}

/// Lock-guarded progress for tasks that only need a fraction and a status.
#[derive(Debug, Default)]
pub struct ProgressCell {
    inner: Mutex<Progress>,
}

impl ProgressCell {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Progress::new(0.0, status)),
        }
    }

    pub fn set(&self, fraction: f64, status: impl Into<String>) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) =
            Progress::new(fraction, status);
    }

    pub fn snapshot(&self) -> Progress {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
