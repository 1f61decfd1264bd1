//! Resilient HTTP request-execution client.
//!
//! A [`Client`] runs every logical call through endpoint selection, circuit
//! breaking, request and response middleware, redirect handling and a
//! cancellable retry loop, over any [`Transport`](http::Transport).

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use client::{Client, RequestBuilder};
pub use config::{load_config, ClientConfig, PanicPolicy};
pub use error::{Error, Result, TransportError, TransportErrorKind};
pub use http::{Body, HyperTransport, Request, Response, Transport};
pub use lifecycle::{CallContext, CancelToken};
