//! Request and response processors.
//!
//! # Responsibilities
//! - Run request processors in registration order before every attempt
//! - Run response processors in registration order after every attempt
//! - Short-circuit the chain on the first error
//!
//! # Design Decisions
//! - Processors are plain `Fn`s or trait objects, shared via `Arc`
//! - Built-ins insert only when absent, so re-running them on a retry is a no-op

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::{Request, Response};

/// Header carrying the call's trace id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Runs before each attempt. Returning an error aborts the attempt with it.
pub trait RequestMiddleware: Send + Sync {
    fn on_request(&self, client: &Client, request: &mut Request) -> Result<()>;
}

/// Runs after each attempt that produced a response.
pub trait ResponseMiddleware: Send + Sync {
    fn on_response(&self, client: &Client, response: &mut Response) -> Result<()>;
}

impl<F> RequestMiddleware for F
where
    F: Fn(&Client, &mut Request) -> Result<()> + Send + Sync,
{
    fn on_request(&self, client: &Client, request: &mut Request) -> Result<()> {
        self(client, request)
    }
}

impl<F> ResponseMiddleware for F
where
    F: Fn(&Client, &mut Response) -> Result<()> + Send + Sync,
{
    fn on_response(&self, client: &Client, response: &mut Response) -> Result<()> {
        self(client, response)
    }
}

/// Ordered request and response processors.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    request: Vec<Arc<dyn RequestMiddleware>>,
    response: Vec<Arc<dyn ResponseMiddleware>>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

impl MiddlewareChain {
    /// The built-in request processors: client headers, then trace id.
    pub fn with_defaults() -> Self {
        Self {
            request: vec![Arc::new(DefaultHeaders), Arc::new(RequestId)],
            response: Vec::new(),
        }
    }

    pub fn push_request(&mut self, middleware: Arc<dyn RequestMiddleware>) {
        self.request.push(middleware);
    }

    pub fn push_response(&mut self, middleware: Arc<dyn ResponseMiddleware>) {
        self.response.push(middleware);
    }

    pub fn set_request(&mut self, middlewares: Vec<Arc<dyn RequestMiddleware>>) {
        self.request = middlewares;
    }

    pub fn set_response(&mut self, middlewares: Vec<Arc<dyn ResponseMiddleware>>) {
        self.response = middlewares;
    }

    pub fn request_len(&self) -> usize {
        self.request.len()
    }

    pub fn response_len(&self) -> usize {
        self.response.len()
    }

    pub(crate) fn run_request(&self, client: &Client, request: &mut Request) -> Result<()> {
        for middleware in &self.request {
            middleware.on_request(client, request)?;
        }
        Ok(())
    }

    pub(crate) fn run_response(&self, client: &Client, response: &mut Response) -> Result<()> {
        for middleware in &self.response {
            middleware.on_response(client, response)?;
        }
        Ok(())
    }
}

/// Copies the client's headers onto the request where not already set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeaders;

impl RequestMiddleware for DefaultHeaders {
    fn on_request(&self, client: &Client, request: &mut Request) -> Result<()> {
        let defaults = client.headers();
        for name in defaults.keys() {
            if request.headers().contains_key(name) {
                continue;
            }
            for value in defaults.get_all(name) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

/// Stamps the trace id as `x-request-id` unless the caller set one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl RequestMiddleware for RequestId {
    fn on_request(&self, _client: &Client, request: &mut Request) -> Result<()> {
        if request.headers().contains_key(&X_REQUEST_ID) {
            return Ok(());
        }
        let value = HeaderValue::from_str(&request.trace_id().to_string()).map_err(|_| {
            Error::InvalidHeader {
                name: X_REQUEST_ID.to_string(),
            }
        })?;
        request.headers_mut().insert(X_REQUEST_ID, value);
        Ok(())
    }
}
