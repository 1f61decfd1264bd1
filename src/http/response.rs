//! Response model.
//!
//! A [`Response`] is built once per attempt from the final hop's
//! [`RawResponse`](super::RawResponse) and the attempt metadata. Only response
//! middleware mutates it after that.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use url::Url;
use uuid::Uuid;

use super::redirect::RedirectHistoryEntry;
use super::transport::RawResponse;

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
    method: Method,
    endpoint: Option<Url>,
    attempt: u32,
    trace_id: Uuid,
    received_at: SystemTime,
    duration: Duration,
    redirect_history: Vec<RedirectHistoryEntry>,
}

/// Everything about the attempt that produced a response.
#[derive(Debug, Clone)]
pub(crate) struct AttemptInfo {
    pub method: Method,
    pub endpoint: Option<Url>,
    pub attempt: u32,
    pub trace_id: Uuid,
    pub duration: Duration,
}

impl Response {
    pub(crate) fn from_raw(
        raw: RawResponse,
        url: Url,
        info: AttemptInfo,
        redirect_history: Vec<RedirectHistoryEntry>,
    ) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            url,
            method: info.method,
            endpoint: info.endpoint,
            attempt: info.attempt,
            trace_id: info.trace_id,
            received_at: SystemTime::now(),
            duration: info.duration,
            redirect_history,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// URL of the final hop.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Method of the final hop (a 303 rewrites it to GET).
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Time spent on the attempt, redirect hops included.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Redirect hops of this attempt, newest first.
    pub fn redirect_history(&self) -> &[RedirectHistoryEntry] {
        &self.redirect_history
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 4xx or 5xx.
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}
