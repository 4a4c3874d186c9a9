//! Engine error type.
//!
//! Errors are contained at the smallest enclosing boundary: a failing job is
//! logged by its worker, a failing task is logged by its background thread,
//! and nothing escapes into the manager or the pool. The variants below are
//! what callers of the engine API actually observe.

use std::path::PathBuf;

use crate::transport::TransportError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used by [`crate::manager::Document`] parsers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No registered plugin claimed the identifier.
    #[error("unsupported identifier: {0}")]
    UnsupportedIdentifier(String),

    /// `start` was called on a task that is not in the `Created` state.
    #[error("task {0} was already started")]
    TaskAlreadyStarted(String),

    /// Network failure after the transport pool's retry budget was spent.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The response body could not be parsed into the requested document type.
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The manager was shut down; no further jobs are accepted.
    #[error("download manager is shut down")]
    ShutDown,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A task's `run()` returned an error or panicked.
    #[error("task {task} failed: {message}")]
    TaskExecution { task: String, message: String },

    /// A job callback returned an error or panicked. Only ever logged.
    #[error("job {job} failed on worker {worker}: {message}")]
    JobExecution {
        worker: usize,
        job: String,
        message: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status if this is a non-success response from the transport.
    pub fn status(&self) -> Option<u32> {
        match self {
            Error::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Renders a panic payload caught by `catch_unwind` for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_http_errors() {
        let err = Error::Transport(TransportError::Status {
            status: 404,
            url: "http://example.com/x".into(),
        });
        assert_eq!(err.status(), Some(404));
        assert_eq!(Error::ShutDown.status(), None);
    }

    #[test]
    fn panic_message_variants() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
