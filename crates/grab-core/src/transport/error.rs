//! Transport error type for retry classification.

/// Failure of a single HTTP exchange.
///
/// Kept separate from [`crate::Error`] so the retry loop can classify it
/// before it propagates to whichever code issued the request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// libcurl reported an error (timeout, connection, body cut short, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response status outside 2xx.
    #[error("HTTP {status} from {url}")]
    Status { status: u32, url: String },
    /// The body sink refused a chunk (disk full, permission denied, ...). Not retried.
    #[error("writing response body: {0}")]
    Sink(#[source] std::io::Error),
}
