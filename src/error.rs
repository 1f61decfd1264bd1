//! Error taxonomy for request execution.
//!
//! # Categories
//! - Transport failures: retryable per retry conditions, terminal once retries run out
//! - Admission rejection (circuit open): retryable by the default conditions
//! - Redirect policy violations: always terminal
//! - Middleware errors: terminal for the attempt, retryable only via custom conditions
//! - Cancellation and deadlines: always terminal
//! - Panics: tagged separately and only ever delivered to panic hooks

use std::time::Duration;

use http::Method;
use thiserror::Error;

use crate::config::ConfigError;
use crate::http::Response;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for request execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection refused, reset, or closed before a response arrived.
    Connect,
    /// Host name could not be resolved.
    Dns,
    /// The transport gave up waiting (connect or attempt timeout).
    Timeout,
    /// Reading or writing the message failed mid-flight.
    Io,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::Dns => "dns",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Other => "other",
        };
        f.write_str(text)
    }
}

/// Raw failure reported by a [`Transport`](crate::http::Transport).
#[derive(Debug, Error)]
#[error("transport error ({kind}): {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Connection-level failures are the ones worth another attempt.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Dns | TransportErrorKind::Timeout
        )
    }
}

/// An error that still carries the response it was raised against.
#[derive(Debug)]
pub struct ResponseError {
    pub response: Box<Response>,
    pub source: Box<Error>,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for ResponseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The circuit breaker rejected the attempt without touching the network.
    #[error("circuit breaker is open; retry after {}ms", retry_after.as_millis())]
    CircuitOpen { retry_after: Duration },

    #[error("{method} \"{url}\": stopped after {hops} redirects")]
    RedirectLimitExceeded {
        method: Method,
        url: String,
        hops: usize,
    },

    #[error("redirect to host {host} is not allowed")]
    RedirectNotAllowed { host: String },

    #[error("invalid redirect location {location}")]
    InvalidRedirectLocation { location: String },

    /// A single-use body was already consumed by an earlier attempt or hop.
    #[error("request body for {method} {url} cannot be replayed")]
    BodyNotReplayable { method: Method, url: String },

    #[error("{0}")]
    Middleware(BoxError),

    #[error(transparent)]
    Response(ResponseError),

    #[error("request canceled")]
    Canceled,

    #[error("request deadline exceeded after {}ms", deadline.as_millis())]
    DeadlineExceeded { deadline: Duration },

    #[error("attempt timed out after {}ms", timeout.as_millis())]
    AttemptTimeout { timeout: Duration },

    #[error("no endpoints available")]
    NoEndpoints,

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name}")]
    InvalidHeader { name: String },

    /// A panic recovered at the call boundary.
    #[error("request panicked: {message}")]
    Panicked { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Wrap a processor error, keeping its message verbatim.
    pub fn middleware(source: impl Into<BoxError>) -> Self {
        Self::Middleware(source.into())
    }

    pub(crate) fn with_response(self, response: Response) -> Self {
        Self::Response(ResponseError {
            response: Box::new(response),
            source: Box::new(self),
        })
    }

    /// Terminal errors end the call regardless of retry conditions.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Canceled
            | Self::DeadlineExceeded { .. }
            | Self::RedirectLimitExceeded { .. }
            | Self::RedirectNotAllowed { .. }
            | Self::InvalidRedirectLocation { .. }
            | Self::BodyNotReplayable { .. }
            | Self::NoEndpoints
            | Self::InvalidUrl { .. }
            | Self::InvalidHeader { .. }
            | Self::Panicked { .. }
            | Self::Config(_) => true,
            Self::Response(inner) => inner.source.is_terminal(),
            _ => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_connection_error(),
            Self::AttemptTimeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded { .. })
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// The response attached to this error, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Response(inner) => Some(inner.response.as_ref()),
            _ => None,
        }
    }
}
