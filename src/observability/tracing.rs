//! Call spans.
//!
//! Every call runs inside a `call` span carrying the trace id, so events from
//! the breaker, balancer and redirect loop correlate without extra plumbing.

use tracing::Span;

use crate::http::Request;

pub fn call_span(request: &Request) -> Span {
    tracing::info_span!(
        "call",
        trace_id = %request.trace_id(),
        method = %request.method(),
        url = %request.url(),
    )
}

pub fn attempt_span(request: &Request) -> Span {
    tracing::debug_span!(
        "attempt",
        attempt = request.attempt(),
        endpoint = request.endpoint().map(|url| url.as_str()).unwrap_or("-"),
    )
}
