//! Outgoing request model.
//!
//! # Responsibilities
//! - Carry method, target, headers, body and per-request policy overrides
//! - Hold the call context (cancellation token and deadline)
//! - Record execution metadata (attempt, trace id, endpoint, resolved url)
//! - Resolve a relative target against the selected endpoint
//!
//! # Design Decisions
//! - Trace id is assigned once at construction and survives every retry
//! - The body is taken only at dispatch, so admission failures never consume it

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::lifecycle::CallContext;
use crate::resilience::RetryCondition;

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Replayable across retries and redirect hops.
    Buffered(Bytes),
    /// Single-use payload; a second read fails.
    Once(Option<Bytes>),
}

/// Marker returned when a single-use body has already been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BodyConsumed;

impl Body {
    pub fn once(bytes: impl Into<Bytes>) -> Self {
        Self::Once(Some(bytes.into()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Buffered(bytes) => bytes.is_empty(),
            Self::Once(bytes) => bytes.as_ref().map_or(true, Bytes::is_empty),
        }
    }

    /// True when the payload can be sent again.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Once(_))
    }

    /// True when a single-use payload has already gone out.
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Once(None))
    }

    /// Payload for one dispatch.
    pub(crate) fn take_payload(&mut self) -> std::result::Result<Option<Bytes>, BodyConsumed> {
        match self {
            Self::Empty => Ok(None),
            Self::Buffered(bytes) => Ok(Some(bytes.clone())),
            Self::Once(slot) => slot.take().map(Some).ok_or(BodyConsumed),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Buffered(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffered(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Buffered(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

/// Per-request settings that take precedence over the client's.
#[derive(Clone, Default)]
pub struct RequestOverrides {
    pub retry_count: Option<u32>,
    pub retry_wait: Option<Duration>,
    pub retry_max_wait: Option<Duration>,
    /// OR'ed with the client's conditions.
    pub retry_conditions: Vec<RetryCondition>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for RequestOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOverrides")
            .field("retry_count", &self.retry_count)
            .field("retry_wait", &self.retry_wait)
            .field("retry_max_wait", &self.retry_max_wait)
            .field("retry_conditions", &self.retry_conditions.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A single logical call. Owned by one caller for the duration of `execute`.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
    pub(crate) overrides: RequestOverrides,
    pub(crate) context: CallContext,
    pub(crate) attempt: u32,
    pub(crate) trace_id: Uuid,
    pub(crate) endpoint: Option<Url>,
    pub(crate) resolved_url: Option<Url>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            overrides: RequestOverrides::default(),
            context: CallContext::default(),
            attempt: 0,
            trace_id: Uuid::new_v4(),
            endpoint: None,
            resolved_url: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target as given: absolute, or a path relative to the endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn overrides(&self) -> &RequestOverrides {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut RequestOverrides {
        &mut self.overrides
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// 1-based attempt number; 0 before the first dispatch.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Endpoint chosen for the current attempt.
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Fully resolved target for the current attempt.
    pub fn resolved_url(&self) -> Option<&Url> {
        self.resolved_url.as_ref()
    }

    /// Redirect the current attempt to a different target.
    pub fn set_resolved_url(&mut self, url: Url) {
        self.resolved_url = Some(url);
    }

    /// Set a header, replacing any existing values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.overrides.retry_count = Some(count);
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration, max_wait: Duration) -> Self {
        self.overrides.retry_wait = Some(wait);
        self.overrides.retry_max_wait = Some(max_wait);
        self
    }

    pub fn with_retry_condition(mut self, condition: RetryCondition) -> Self {
        self.overrides.retry_conditions.push(condition);
        self
    }

    pub(crate) fn is_absolute(&self) -> bool {
        Url::parse(&self.url).map_or(false, |url| url.has_host())
    }

    /// Resolve the target against `base`, joining with exactly one `/`.
    pub(crate) fn resolve(&self, base: Option<&Url>) -> Result<Url> {
        if let Ok(url) = Url::parse(&self.url) {
            if url.has_host() {
                return Ok(url);
            }
        }

        let base = base.ok_or_else(|| Error::InvalidUrl {
            url: self.url.clone(),
            reason: "relative url without a base url or endpoint".to_string(),
        })?;

        let joined = if self.url.is_empty() {
            base.as_str().to_string()
        } else {
            format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                self.url.trim_start_matches('/')
            )
        };

        Url::parse(&joined).map_err(|err| Error::InvalidUrl {
            url: joined,
            reason: err.to_string(),
        })
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let invalid = || Error::InvalidHeader {
        name: name.to_string(),
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((header_name, header_value))
}
