//! Logs, metrics and spans for the request pipeline.
//!
//! # Data Flow
//! ```text
//! Client::execute
//!     → tracing.rs  `call` span (trace_id, method, url), `attempt` span per try
//!     → logging.rs  subscriber installed by the binary: stderr, plain or JSON
//!     → metrics.rs  calls, attempts, retries, redirects, breaker, endpoint health
//!                   (rendered as Prometheus text by the CLI on request)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing a subscriber or recorder is the embedder's call
//! - Without a recorder every metric call is a no-op
//! - The trace id on the call span matches the `x-request-id` header

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::init_logging;
