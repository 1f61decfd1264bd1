//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt n:
//!     → circuit_breaker.rs (admit, or fail fast with CircuitOpen)
//!     → timeouts.rs (bound the exchange by the per-attempt timeout)
//!     → circuit_breaker.rs (feedback: failure policies decide the outcome)
//!     → retries.rs (retry conditions, backoff delay, retry hooks)
//!     → budget.rs (optional cap on retries relative to first attempts)
//!     → backoff.rs (equal jitter, clamped to [wait, max_wait])
//! ```
//!
//! # Design Decisions
//! - The breaker is shared by every clone of a client; its lock never spans I/O
//! - Open → half-open happens lazily on the next admission check, no timers
//! - Retry conditions are OR'ed; terminal errors bypass them entirely
//! - Backoff sleeps are cancellable through the call context

pub mod backoff;
pub mod budget;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_backoff, parse_retry_after};
pub use budget::RetryBudget;
pub use circuit_breaker::{
    server_error_policy, transport_error_policy, Admission, CircuitBreaker, CircuitState,
    FailurePolicy,
};
pub use retries::{
    default_retry_condition, outcome_parts, RetryCondition, RetryEvent, RetryHook, RetryPolicy,
};
pub use timeouts::within;
