//! Work items executed by the worker pool.

use std::fmt;

use super::priority::Priority;
use super::scope::ScopeTicket;

/// Job body. Arguments are whatever the closure captured.
pub type JobFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// A prioritized callback, consumed exactly once by one worker.
pub struct Job {
    pub(crate) priority: Priority,
    pub(crate) label: String,
    pub(crate) callback: JobFn,
    pub(crate) ticket: Option<ScopeTicket>,
}

impl Job {
    pub fn new<F>(priority: impl Into<Priority>, callback: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            priority: priority.into(),
            label: "job".to_string(),
            callback: Box::new(callback),
            ticket: None,
        }
    }

    /// Name shown in worker logs.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub(crate) fn with_ticket(mut self, ticket: ScopeTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn priority(&self) -> &Priority {
        &self.priority
    }

    pub fn name(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("priority", &self.priority)
            .field("label", &self.label)
            .field("scoped", &self.ticket.is_some())
            .finish()
    }
}
