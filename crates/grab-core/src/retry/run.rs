//! Retry loop: run a closure until success or the policy says stop.

use super::classify::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::transport::TransportError;

/// Calls `f` with the 1-based attempt number until it succeeds or the policy
/// gives up, sleeping for the backoff delay between attempts. The last error
/// is returned unchanged.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, mut f: F) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Result<T, TransportError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, "retrying after error: {}", e);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
