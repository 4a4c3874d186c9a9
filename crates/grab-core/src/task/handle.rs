//! Task lifecycle: Created -> Running -> Finished | Failed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Progress, Task, TaskContext};
use crate::error::{panic_message, Error, Result};
use crate::manager::DownloadManager;
use crate::queue::JobScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Created,
    /// `run` is executing or its jobs are still outstanding.
    Running,
    Finished,
    /// `run` returned an error or panicked.
    Failed(String),
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed(_))
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: Mutex<TaskState>,
    changed: Condvar,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: TaskState) {
        *self.lock() = next;
        self.changed.notify_all();
    }
}

/// A resolved task plus its execution state.
pub struct TaskHandle {
    task: Arc<dyn Task>,
    plugin: &'static str,
    lifecycle: Arc<Lifecycle>,
    scope: JobScope,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TaskHandle {
    pub fn new(plugin: &'static str, task: Box<dyn Task>) -> Self {
        Self {
            task: Arc::from(task),
            plugin,
            lifecycle: Arc::new(Lifecycle {
                state: Mutex::new(TaskState::Created),
                changed: Condvar::new(),
            }),
            scope: JobScope::new(),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Name of the plugin that claimed the identifier.
    pub fn plugin(&self) -> &'static str {
        self.plugin
    }

    /// Binds the task to `manager` and runs it on a background thread.
    /// The task finishes once `run` returned and every job it enqueued has
    /// completed. A task can be started only once.
    pub fn start(&self, manager: &DownloadManager) -> Result<()> {
        let mut state = self.lifecycle.lock();
        if *state != TaskState::Created {
            return Err(Error::TaskAlreadyStarted(self.name().to_string()));
        }
        let ctx = TaskContext::new(
            manager,
            self.scope.clone(),
            self.task.name(),
            self.task.base_url(),
            self.task.output_subdir(),
        )?;

        let task = Arc::clone(&self.task);
        let lifecycle = Arc::clone(&self.lifecycle);
        let scope = self.scope.clone();
        let spawned = thread::Builder::new()
            .name(format!("grab-task-{}", self.plugin))
            .spawn(move || {
                let next = execute(task.as_ref(), ctx, &scope);
                lifecycle.set(next);
            });
        match spawned {
            Ok(handle) => {
                *state = TaskState::Running;
                drop(state);
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                tracing::debug!(task = %self.name(), plugin = self.plugin, "task started");
                Ok(())
            }
            Err(e) => {
                *state = TaskState::Failed(format!("failed to spawn task thread: {}", e));
                Err(Error::Spawn(e))
            }
        }
    }

    /// Waits up to `timeout` (`None` = forever) for the task to finish and
    /// returns whether it did. A zero timeout only polls. A task that was
    /// never started never finishes, so this returns `false` for it at once.
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lifecycle.lock();
        loop {
            match *state {
                TaskState::Created => return false,
                TaskState::Finished | TaskState::Failed(_) => break,
                TaskState::Running => {}
            }
            state = match deadline {
                None => self
                    .lifecycle
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.lifecycle
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        drop(state);
        self.reap();
        true
    }

    /// Joins the background thread if it already exited.
    fn reap(&self) {
        let mut slot = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = slot.take() {
                let _ = handle.join();
            }
        }
    }

    /// Never blocks on the task's work; only the task's own progress lock.
    pub fn progress(&self) -> Progress {
        self.task.progress()
    }

    pub fn state(&self) -> TaskState {
        self.lifecycle.lock().clone()
    }

    /// Failure message when the task failed.
    pub fn error(&self) -> Option<String> {
        match self.state() {
            TaskState::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Jobs this task enqueued that have not finished yet.
    pub fn pending_jobs(&self) -> usize {
        self.scope.pending()
    }

    pub fn task(&self) -> &dyn Task {
        self.task.as_ref()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.name())
            .field("plugin", &self.plugin)
            .field("state", &self.state())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

/// Body of the task thread. Returns the terminal state.
fn execute(task: &dyn Task, ctx: TaskContext, scope: &JobScope) -> TaskState {
    let name = task.name().to_string();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&ctx)));
    // The context holds a manager clone; release it before reporting done.
    drop(ctx);
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };
    match failure {
        None => {
            let pending = scope.pending();
            if pending > 0 {
                tracing::debug!(task = %name, pending, "run finished, waiting for jobs");
            }
            scope.wait_idle(None);
            tracing::info!(task = %name, "task finished");
            TaskState::Finished
        }
        Some(message) => {
            let err = Error::TaskExecution {
                task: name.clone(),
                message: message.clone(),
            };
            tracing::error!(task = %name, "{}", err);
            TaskState::Failed(message)
        }
    }
}
