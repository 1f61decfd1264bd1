//! Metrics collection.
//!
//! # Responsibilities
//! - Define client metrics (calls, attempts, retries, redirects, breaker state)
//! - Track per-endpoint health
//!
//! # Metrics
//! - `client_calls_total` (counter): finished calls by method, outcome
//! - `client_call_duration_seconds` (histogram): call latency, retries included
//! - `client_attempts_total` (counter): attempts by outcome
//! - `client_retries_total` (counter): scheduled retries
//! - `client_redirects_total` (counter): followed or inspected redirects by status
//! - `client_circuit_transitions_total` (counter): breaker transitions by target state
//! - `client_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `client_endpoint_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without a recorder it is a no-op
//! - Exposition is the embedder's choice (the CLI renders Prometheus text)

use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::resilience::CircuitState;

/// Install a Prometheus recorder and return the handle used to render it.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_call(method: &str, outcome: &'static str, started: Instant) {
    metrics::counter!("client_calls_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("client_call_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt(outcome: &'static str) {
    metrics::counter!("client_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry() {
    metrics::counter!("client_retries_total").increment(1);
}

pub fn record_redirect(status: u16) {
    metrics::counter!("client_redirects_total", "status" => status.to_string()).increment(1);
}

pub fn record_circuit_transition(from: CircuitState, to: CircuitState) {
    metrics::counter!(
        "client_circuit_transitions_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
    metrics::gauge!("client_circuit_state").set(f64::from(to as u8));
}

pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    metrics::gauge!("client_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
