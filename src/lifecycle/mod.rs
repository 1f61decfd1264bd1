//! Call lifecycle management.
//!
//! # Data Flow
//! ```text
//! Caller creates CallContext (cancel token + optional deadline)
//!     → Client links it to the client-level token
//!     → Every blocking point races against it:
//!         - backoff sleep between attempts
//!         - transport send (per hop)
//!     → First signal wins: Canceled / DeadlineExceeded (terminal)
//!
//! Client::shutdown():
//!     → cancels the client-level token
//!     → every linked call observes it at its next blocking point
//! ```
//!
//! # Design Decisions
//! - Cancellation is level-triggered (watch channel), late observers still see it
//! - A deadline is absolute; per-attempt timeouts live in resilience::timeouts
//! - Cancellation is never converted into a retryable failure

pub mod cancel;

pub use cancel::{CallContext, CancelToken};
