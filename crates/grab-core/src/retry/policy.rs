use std::time::Duration;

/// Retry-relevant category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or transfer timed out.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Connection reset, DNS failure, body cut short, ...
    Connection,
    /// Other 5xx status.
    Http5xx(u16),
    /// Not worth retrying (4xx, local write failure, bad URL).
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with an attempt budget and a delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first one; 1 disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || kind == ErrorKind::Other {
            return RetryDecision::NoRetry;
        }
        // base * 2^(attempt-1); shift capped so the multiplier cannot overflow.
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}
