//! HTTP message model and the wire boundary.
//!
//! # Data Flow
//! ```text
//! Request (method, url, headers, body, overrides)
//!     → middleware.rs (request processors, in registration order)
//!     → transport.rs (PreparedRequest → RawResponse, one network exchange)
//!     → redirect.rs (hop loop, policy check per 3xx, history newest-first)
//!     → response.rs (Response with attempt metadata)
//!     → middleware.rs (response processors, in registration order)
//! ```
//!
//! # Design Decisions
//! - Bodies are fully buffered; a `Once` body models a single-use stream
//! - The transport is a trait so tests can script exchanges without sockets
//! - Redirects are followed above the transport, so every hop is observable

pub mod middleware;
pub mod redirect;
pub mod request;
pub mod response;
pub mod transport;

pub use middleware::{
    DefaultHeaders, MiddlewareChain, RequestId, RequestMiddleware, ResponseMiddleware, X_REQUEST_ID,
};
pub use redirect::{
    DomainCheckRedirect, FlexibleRedirect, NoRedirect, RedirectContext, RedirectDecision,
    RedirectHistoryEntry, RedirectPolicies, RedirectPolicy,
};
pub use request::{Body, Request, RequestOverrides};
pub use response::Response;
pub use transport::{HyperTransport, PreparedRequest, RawResponse, Transport};
