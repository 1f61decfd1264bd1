//! Balancer construction from configuration.

use std::sync::Arc;

use crate::config::{LoadBalancerConfig, Strategy};
use crate::error::Result;
use crate::load_balancer::{Endpoint, HealthAware, LoadBalancer, RoundRobin, WeightedRoundRobin};

/// Build the configured balancer; `None` when no endpoints are configured.
pub fn build_load_balancer(config: &LoadBalancerConfig) -> Result<Option<Arc<dyn LoadBalancer>>> {
    if config.endpoints.is_empty() {
        return Ok(None);
    }

    let endpoints = config
        .endpoints
        .iter()
        .map(|endpoint| Endpoint::parse(&endpoint.url, endpoint.weight).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    let lb: Arc<dyn LoadBalancer> = match config.strategy {
        Strategy::RoundRobin => Arc::new(RoundRobin::new(endpoints)?),
        Strategy::WeightedRoundRobin => Arc::new(WeightedRoundRobin::new(endpoints)?),
        Strategy::HealthAware => Arc::new(HealthAware::new(endpoints)?.with_config(config)),
    };

    tracing::debug!(
        strategy = ?config.strategy,
        endpoint_count = lb.endpoints().len(),
        "load balancer configured"
    );
    Ok(Some(lb))
}
