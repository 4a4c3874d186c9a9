//! Transport pool: shared, bounded set of reusable libcurl handles.
//!
//! Every network request issued by tasks and jobs goes through here. Each
//! `Easy` handle keeps its own connection cache, so returning handles to the
//! pool instead of dropping them gives keep-alive reuse across requests. At
//! most `capacity` transfers run at once; further callers block until a
//! handle is released.

mod error;
mod request;
mod sink;

pub use error::TransportError;
pub use request::{merge_headers, Method, Request, Response, ResponseHead};
pub use sink::{BodySink, FnSink};

use std::cell::Cell;
use std::io;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use curl::easy::{Easy, List};

use crate::config::EngineConfig;
use crate::retry::{run_with_retry, RetryPolicy};

/// Per-request time limits.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    /// Hard wall-clock cap for the whole transfer.
    pub total: Duration,
    /// Abort when throughput stays below 1 KiB/s for this long.
    pub stall: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            total: Duration::from_secs(3600),
            stall: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct Slots {
    idle: Vec<Easy>,
    leased: usize,
}

pub struct TransportPool {
    slots: Mutex<Slots>,
    released: Condvar,
    capacity: usize,
    policy: RetryPolicy,
    timeouts: Timeouts,
    default_headers: Vec<(String, String)>,
}

impl TransportPool {
    pub fn new(
        capacity: usize,
        policy: RetryPolicy,
        timeouts: Timeouts,
        default_headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            released: Condvar::new(),
            capacity: capacity.max(1),
            policy,
            timeouts,
            default_headers,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        let timeouts = Timeouts {
            connect: Duration::from_secs(cfg.connect_timeout_secs),
            total: Duration::from_secs(cfg.timeout_secs),
            stall: Duration::from_secs(cfg.stall_timeout_secs),
        };
        let mut defaults = vec![("User-Agent".to_string(), cfg.user_agent())];
        defaults.extend(
            cfg.default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        // Configured headers may themselves override the User-Agent.
        let defaults = merge_headers(&defaults[..1], &defaults[1..]);
        Self::new(cfg.max_connections, cfg.retry_policy(), timeouts, defaults)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of handles currently leased to in-flight requests.
    pub fn in_use(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .leased
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// Issues `req`, streaming the body into `sink`, retrying per the pool's
    /// policy. Non-2xx statuses are errors; the sink is reset before each attempt.
    pub fn execute(
        &self,
        req: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, TransportError> {
        let headers = merge_headers(&self.default_headers, &req.headers);
        run_with_retry(&self.policy, |attempt| {
            sink.reset().map_err(TransportError::Sink)?;
            let head = self.perform(req, &headers, sink)?;
            tracing::trace!(
                method = req.method.as_str(),
                url = %req.url,
                status = head.status,
                attempt,
                "request finished"
            );
            if !head.is_success() {
                return Err(TransportError::Status {
                    status: head.status,
                    url: req.url.clone(),
                });
            }
            Ok(head)
        })
    }

    /// Issues `req` and buffers the whole body.
    pub fn fetch(&self, req: &Request) -> Result<Response, TransportError> {
        let mut body = Vec::new();
        let head = self.execute(req, &mut body)?;
        Ok(Response { head, body })
    }

    fn perform(
        &self,
        req: &Request,
        headers: &[(String, String)],
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, TransportError> {
        let mut lease = self.lease();
        let easy = lease.easy();
        // Resets options but keeps the connection cache.
        easy.reset();
        easy.url(&req.url)?;
        match req.method {
            Method::Get => easy.get(true)?,
            Method::Head => easy.nobody(true)?,
            Method::Post => easy.post(true)?,
            other => easy.custom_request(other.as_str())?,
        }
        if req.method.sends_body() {
            easy.post_fields_copy(req.body.as_deref().unwrap_or_default())?;
        }
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.timeouts.connect)?;
        easy.timeout(self.timeouts.total)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(self.timeouts.stall)?;

        let mut list = List::new();
        for (k, v) in headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        easy.http_headers(list)?;

        let mut raw_headers: Vec<String> = Vec::new();
        let mut sink_error: Option<io::Error> = None;
        // Only 2xx bodies reach the sink; redirect and error pages are drained.
        let body_wanted = Cell::new(true);
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                let line = String::from_utf8_lossy(data).into_owned();
                if let Some(status) = status_line_code(&line) {
                    body_wanted.set((200..300).contains(&status));
                }
                raw_headers.push(line);
                true
            })?;
            transfer.write_function(|data| {
                if !body_wanted.get() {
                    return Ok(data.len());
                }
                match sink.write_chunk(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        sink_error = Some(e);
                        // Short count makes libcurl abort with a write error.
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };
        if let Err(e) = performed {
            if let Some(io_err) = sink_error {
                return Err(TransportError::Sink(io_err));
            }
            return Err(TransportError::Curl(e));
        }

        let status = easy.response_code()?;
        let url = easy
            .effective_url()?
            .map(str::to_string)
            .unwrap_or_else(|| req.url.clone());
        Ok(ResponseHead::from_raw_lines(status, url, &raw_headers))
    }

    fn lease(&self) -> Lease<'_> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(easy) = slots.idle.pop() {
                slots.leased += 1;
                return Lease {
                    pool: self,
                    easy: Some(easy),
                };
            }
            if slots.leased < self.capacity {
                slots.leased += 1;
                return Lease {
                    pool: self,
                    easy: Some(Easy::new()),
                };
            }
            slots = self
                .released
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Status code of an `HTTP/x 200 OK` line, `None` for any other header line.
fn status_line_code(line: &str) -> Option<u32> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// A handle borrowed from the pool; returned on drop.
struct Lease<'a> {
    pool: &'a TransportPool,
    easy: Option<Easy>,
}

impl Lease<'_> {
    fn easy(&mut self) -> &mut Easy {
        self.easy.get_or_insert_with(Easy::new)
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .pool
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        slots.leased -= 1;
        if let Some(easy) = self.easy.take() {
            slots.idle.push(easy);
        }
        drop(slots);
        self.pool.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn from_config_sets_user_agent_and_defaults() {
        let mut cfg = EngineConfig::default();
        cfg.max_connections = 0;
        cfg.default_headers
            .insert("Accept".to_string(), "text/html".to_string());
        let pool = TransportPool::from_config(&cfg);
        assert_eq!(pool.capacity(), 1);
        let names: Vec<&str> = pool
            .default_headers()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(names, vec!["User-Agent", "Accept"]);
    }

    #[test]
    fn configured_user_agent_header_replaces_builtin() {
        let mut cfg = EngineConfig::default();
        cfg.default_headers
            .insert("user-agent".to_string(), "mine".to_string());
        let pool = TransportPool::from_config(&cfg);
        assert_eq!(
            pool.default_headers().to_vec(),
            vec![("user-agent".to_string(), "mine".to_string())]
        );
    }

    #[test]
    fn status_lines_gate_the_body() {
        assert_eq!(status_line_code("HTTP/1.1 503 Service Unavailable\r\n"), Some(503));
        assert_eq!(status_line_code("HTTP/2 200\r\n"), Some(200));
        assert_eq!(status_line_code("Content-Length: 9\r\n"), None);
        assert_eq!(status_line_code("\r\n"), None);
    }

    #[test]
    fn lease_blocks_at_capacity_and_reuses_handles() {
        let pool = Arc::new(TransportPool::new(
            1,
            RetryPolicy::none(),
            Timeouts::default(),
            Vec::new(),
        ));
        let first = pool.lease();
        assert_eq!(pool.in_use(), 1);

        let (tx, rx) = std::sync::mpsc::channel();
        let p = Arc::clone(&pool);
        let waiter = std::thread::spawn(move || {
            let _second = p.lease();
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(first);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.slots.lock().unwrap().idle.len(), 1);
    }
}
