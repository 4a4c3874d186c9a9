//! Minimal HTTP/1.1 server for integration tests.
//!
//! Each path maps to a [`Route`]. Every response carries `Connection: close`
//! and the socket is closed after one exchange. Hits are counted per path.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Route {
    /// 200 with the body.
    Body(Vec<u8>),
    /// Declares `declared` bytes, sends `sent`, then closes mid-body.
    Truncated { declared: usize, sent: Vec<u8> },
    /// The status with a small error page as body.
    Status(u16),
    /// Answers `status` with an error page for the first `failures` hits,
    /// then 200 with `body`.
    FailFirst {
        failures: usize,
        status: u16,
        body: Vec<u8>,
    },
    /// 200 whose body is the request's header lines, one `name: value` per line.
    EchoHeaders,
}

/// Body sent with every non-200 response.
pub const ERROR_PAGE: &[u8] = b"<html>try again later</html>\n";

pub struct TestServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    /// Serves `routes` on an ephemeral port until the process exits.
    pub fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(p, r)| (p.to_string(), r))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&counter);
                thread::spawn(move || handle(stream, &routes, &hits));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            hits,
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(data).ok()
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Route>, hits: &Mutex<HashMap<String, usize>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or("/").to_string();
    let headers: Vec<&str> = lines.take_while(|l| !l.is_empty()).collect();

    let hit = {
        let mut hits = hits.lock().unwrap();
        let n = hits.entry(path.clone()).or_insert(0);
        *n += 1;
        *n
    };
    let is_head = method.eq_ignore_ascii_case("HEAD");

    match routes.get(&path) {
        None => respond(&mut stream, 404, ERROR_PAGE, is_head),
        Some(Route::Body(body)) => respond(&mut stream, 200, body, is_head),
        Some(Route::Status(code)) => respond(&mut stream, *code, ERROR_PAGE, is_head),
        Some(Route::FailFirst {
            failures,
            status,
            body,
        }) => {
            if hit <= *failures {
                respond(&mut stream, *status, ERROR_PAGE, is_head)
            } else {
                respond(&mut stream, 200, body, is_head)
            }
        }
        Some(Route::EchoHeaders) => {
            let body = headers.join("\n");
            respond(&mut stream, 200, body.as_bytes(), is_head)
        }
        Some(Route::Truncated { declared, sent }) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(sent);
            let _ = stream.flush();
        }
    }
}

fn respond(stream: &mut TcpStream, status: u16, body: &[u8], is_head: bool) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    if !is_head {
        let _ = stream.write_all(body);
    }
    let _ = stream.flush();
}
