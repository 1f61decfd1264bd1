//! Wire transport.
//!
//! # Responsibilities
//! - Perform exactly one HTTP exchange per `send` (no redirects, no retries)
//! - Buffer the response body
//! - Classify failures into [`TransportErrorKind`]s for retry decisions
//!
//! # Design Decisions
//! - Pooled hyper-util client, shared by every clone of the transport
//! - Connect timeout lives in the connector; attempt timeouts live above

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::config::TimeoutConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::lifecycle::CancelToken;

/// A request with its target resolved and its body materialized.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The status, headers and buffered body of one exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// One network exchange. Implementations must be safe to share across tasks.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(
        &self,
        request: PreparedRequest,
        cancel: &CancelToken,
    ) -> Result<RawResponse, TransportError>;
}

/// Default transport backed by the hyper-util pooled client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient<HttpConnector, Full<Bytes>>,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(Some(Duration::from_secs(5)))
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::with_connect_timeout(config.connect_ms.map(Duration::from_millis))
    }

    pub fn with_connect_timeout(connect_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(connect_timeout);
        connector.set_keepalive(Some(Duration::from_secs(90)));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(connector);

        Self { client }
    }

    async fn exchange(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outgoing = builder
            .body(Full::new(request.body.unwrap_or_default()))
            .map_err(|err| TransportError::new(TransportErrorKind::Other, err))?;

        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(|err| TransportError::new(classify_transport_error(&err), err))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|err| TransportError::new(TransportErrorKind::Io, err))?
            .to_bytes();

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        request: PreparedRequest,
        cancel: &CancelToken,
    ) -> Result<RawResponse, TransportError> {
        tracing::trace!(method = %request.method, url = %request.url, "sending request");
        tokio::select! {
            biased;
            _ = cancel.canceled() => Err(TransportError::new(
                TransportErrorKind::Other,
                "exchange aborted by cancellation",
            )),
            result = self.exchange(request) => result,
        }
    }
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    let text = error_chain_text(error);
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("timed out") || text.contains("timeout") {
            return TransportErrorKind::Timeout;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("connection reset")
        || text.contains("connection closed")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Io;
    }
    TransportErrorKind::Other
}

fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string().to_ascii_lowercase();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string().to_ascii_lowercase());
        source = inner.source();
    }
    text
}
