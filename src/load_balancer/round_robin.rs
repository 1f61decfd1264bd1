//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::Response;
use crate::load_balancer::{require_endpoints, Endpoint, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints; each `next` claims
/// a distinct counter value, so concurrent callers never share a slot.
#[derive(Debug)]
pub struct RoundRobin {
    endpoints: Vec<Arc<Endpoint>>,
    counter: AtomicUsize,
    closed: AtomicBool,
}

impl RoundRobin {
    pub fn new(endpoints: Vec<Arc<Endpoint>>) -> Result<Self> {
        require_endpoints(&endpoints)?;
        Ok(Self {
            endpoints,
            counter: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|url| Endpoint::parse(url.as_ref(), 1).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Self::new(endpoints)
    }
}

impl LoadBalancer for RoundRobin {
    fn next(&self) -> Result<Arc<Endpoint>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NoEndpoints);
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        let endpoint = &self.endpoints[index];
        endpoint.record_selection();
        Ok(endpoint.clone())
    }

    fn feedback(&self, _endpoint: &Endpoint, _response: Option<&Response>, _error: Option<&Error>) {}

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }
}
