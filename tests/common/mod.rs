//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderValue, LOCATION, RETRY_AFTER};
use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use resilient_client::http::{PreparedRequest, RawResponse, Transport};
use resilient_client::lifecycle::CancelToken;
use resilient_client::{TransportError, TransportErrorKind};

type Handler =
    dyn Fn(&PreparedRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync;

/// In-memory transport driven by a handler that sees each request and its
/// zero-based call index.
pub struct MockTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<PreparedRequest>>,
    count: AtomicUsize,
    delay: Option<Duration>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .field("delay", &self.delay)
            .finish()
    }
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&PreparedRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            delay: None,
        })
    }

    /// Every exchange waits `delay` before the handler answers.
    pub fn slow<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&PreparedRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn always(status: u16) -> Arc<Self> {
        Self::new(move |_, _| Ok(response(status)))
    }

    /// Answers with `statuses` in order, repeating the last one.
    pub fn statuses(statuses: &[u16]) -> Arc<Self> {
        let script: VecDeque<u16> = statuses.iter().copied().collect();
        Self::new(move |_, index| {
            let status = script
                .get(index)
                .or_else(|| script.back())
                .copied()
                .unwrap_or(200);
            Ok(response(status))
        })
    }

    pub fn refusing() -> Arc<Self> {
        Self::new(|_, _| Err(connect_error()))
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<PreparedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<PreparedRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: PreparedRequest,
        _cancel: &CancelToken,
    ) -> Result<RawResponse, TransportError> {
        let index = self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request, index)
    }
}

pub fn response(status: u16) -> RawResponse {
    RawResponse::new(StatusCode::from_u16(status).unwrap())
}

pub fn response_with_body(status: u16, body: &'static str) -> RawResponse {
    let mut raw = response(status);
    raw.body = body.into();
    raw
}

pub fn redirect(status: u16, location: &str) -> RawResponse {
    let mut raw = response(status);
    raw.headers
        .insert(LOCATION, HeaderValue::from_str(location).unwrap());
    raw
}

pub fn retry_after(status: u16, seconds: u64) -> RawResponse {
    let mut raw = response(status);
    raw.headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
    raw
}

pub fn connect_error() -> TransportError {
    TransportError::new(TransportErrorKind::Connect, "connection refused")
}

/// One request as seen by [`start_programmable_backend`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the backend answers: status, extra headers, body.
pub type Reply = (u16, Vec<(String, String)>, String);

/// Start a programmable HTTP/1.1 backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(seen) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, headers, body) = f(seen).await;
                        let reason = StatusCode::from_u16(status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");
                        let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
                        for (name, value) in headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        ));
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(body.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(SeenRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}
