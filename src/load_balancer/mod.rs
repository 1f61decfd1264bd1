//! Endpoint selection.
//!
//! # Data Flow
//! ```text
//! Attempt starts with a relative target
//!     → LoadBalancer::next (pick an endpoint):
//!         - round_robin.rs (strict rotation)
//!         - weighted.rs (smooth weighted rotation)
//!         - health_aware.rs (rotation that skips unhealthy endpoints)
//!     → endpoint.rs (base URL the request path is joined onto)
//!     → attempt outcome
//!     → LoadBalancer::feedback (passive health for the chosen endpoint)
//! ```
//!
//! # Design Decisions
//! - Balancers are shared by every clone of a client and must be lock-light
//! - An empty endpoint set is rejected at construction, not at selection
//! - `close` is terminal: every later `next` fails with `NoEndpoints`
//! - Requests with an absolute URL bypass the balancer

pub mod endpoint;
pub mod health_aware;
pub mod pool;
pub mod round_robin;
pub mod weighted;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::Response;

pub use endpoint::{Endpoint, HealthState};
pub use health_aware::HealthAware;
pub use pool::build_load_balancer;
pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

/// Picks the endpoint for each attempt.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next(&self) -> Result<Arc<Endpoint>>;

    /// Outcome of an attempt sent to `endpoint`.
    fn feedback(&self, endpoint: &Endpoint, response: Option<&Response>, error: Option<&Error>);

    /// Stop handing out endpoints.
    fn close(&self);

    fn endpoints(&self) -> &[Arc<Endpoint>];
}

pub(crate) fn require_endpoints(endpoints: &[Arc<Endpoint>]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(Error::NoEndpoints);
    }
    Ok(())
}
