//! Retry and backoff for transport requests.
//!
//! Errors are classified (timeouts, throttling, connection failures, 5xx)
//! and retried with capped exponential backoff. Nothing above the transport
//! layer retries on its own.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
