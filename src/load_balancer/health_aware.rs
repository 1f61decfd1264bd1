//! Health-aware rotation.
//!
//! # Responsibilities
//! - Rotate like round-robin, skipping endpoints marked unhealthy
//! - Mark endpoints from attempt outcomes (passive health checking)
//! - Let an unhealthy endpoint take a probe attempt after a cooldown
//!
//! # Design Decisions
//! - Only connection errors and 502/503/504 count against an endpoint;
//!   4xx and other 5xx are the application's answer, not an outage
//! - When every endpoint is unhealthy, fall back to plain rotation rather than fail

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::config::LoadBalancerConfig;
use crate::error::{Error, Result};
use crate::http::Response;
use crate::load_balancer::{require_endpoints, Endpoint, LoadBalancer};
use crate::observability::metrics;

/// Whether an attempt outcome should count against the endpoint.
pub fn is_endpoint_failure(response: Option<&Response>, error: Option<&Error>) -> bool {
    if error.map_or(false, Error::is_connection_error) {
        return true;
    }
    response.map_or(false, |response| {
        matches!(
            response.status(),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        )
    })
}

#[derive(Debug)]
pub struct HealthAware {
    endpoints: Vec<Arc<Endpoint>>,
    counter: AtomicUsize,
    closed: AtomicBool,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
    cooldown: Duration,
}

impl HealthAware {
    pub fn new(endpoints: Vec<Arc<Endpoint>>) -> Result<Self> {
        require_endpoints(&endpoints)?;
        Ok(Self {
            endpoints,
            counter: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            cooldown: Duration::from_secs(10),
        })
    }

    pub fn with_config(mut self, config: &LoadBalancerConfig) -> Self {
        self.unhealthy_threshold = config.unhealthy_threshold.max(1);
        self.healthy_threshold = config.healthy_threshold.max(1);
        self.cooldown = Duration::from_millis(config.cooldown_ms);
        self
    }

    pub fn thresholds(mut self, unhealthy: u32, healthy: u32) -> Self {
        self.unhealthy_threshold = unhealthy.max(1);
        self.healthy_threshold = healthy.max(1);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl LoadBalancer for HealthAware {
    fn next(&self) -> Result<Arc<Endpoint>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NoEndpoints);
        }

        let start_count = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = self.endpoints.len();

        let chosen = (0..len)
            .map(|i| &self.endpoints[(start_count + i) % len])
            .find(|endpoint| endpoint.try_acquire(self.cooldown))
            .unwrap_or_else(|| {
                tracing::debug!(endpoint_count = len, "all endpoints unhealthy, rotating anyway");
                &self.endpoints[start_count % len]
            });

        chosen.record_selection();
        Ok(chosen.clone())
    }

    fn feedback(&self, endpoint: &Endpoint, response: Option<&Response>, error: Option<&Error>) {
        if is_endpoint_failure(response, error) {
            if endpoint.mark_failure(self.unhealthy_threshold) {
                tracing::warn!(endpoint = %endpoint.url(), "endpoint marked unhealthy");
                metrics::record_endpoint_health(endpoint.url().as_str(), false);
            }
        } else if endpoint.mark_success(self.healthy_threshold) {
            tracing::info!(endpoint = %endpoint.url(), "endpoint marked healthy");
            metrics::record_endpoint_health(endpoint.url().as_str(), true);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }
}
