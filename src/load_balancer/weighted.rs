//! Smooth weighted round-robin.
//!
//! Each pick adds every endpoint's weight to its running score, takes the
//! highest score and subtracts the total weight from it. Over one cycle of
//! `sum(weights)` picks each endpoint is chosen exactly `weight` times, with
//! heavy endpoints spread out instead of bunched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::http::Response;
use crate::load_balancer::{require_endpoints, Endpoint, LoadBalancer};

#[derive(Debug)]
pub struct WeightedRoundRobin {
    endpoints: Vec<Arc<Endpoint>>,
    scores: Mutex<Vec<i64>>,
    total_weight: i64,
    closed: AtomicBool,
}

impl WeightedRoundRobin {
    pub fn new(endpoints: Vec<Arc<Endpoint>>) -> Result<Self> {
        require_endpoints(&endpoints)?;
        let total_weight = endpoints.iter().map(|e| i64::from(e.weight())).sum();
        Ok(Self {
            scores: Mutex::new(vec![0; endpoints.len()]),
            endpoints,
            total_weight,
            closed: AtomicBool::new(false),
        })
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next(&self) -> Result<Arc<Endpoint>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NoEndpoints);
        }

        let mut scores = self.scores.lock().unwrap_or_else(PoisonError::into_inner);
        let mut best = 0;
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            scores[index] += i64::from(endpoint.weight());
            if scores[index] > scores[best] {
                best = index;
            }
        }
        scores[best] -= self.total_weight;
        drop(scores);

        let endpoint = &self.endpoints[best];
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
