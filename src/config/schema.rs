//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for a client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for relative request paths when no endpoints are configured.
    pub base_url: Option<String>,

    /// Headers added to every request unless the request sets them.
    pub headers: BTreeMap<String, String>,

    /// User-Agent header value.
    pub user_agent: Option<String>,

    /// Endpoint set and selection strategy.
    pub load_balancer: LoadBalancerConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Redirect following.
    pub redirects: RedirectConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// What to do with a panic raised inside a call.
    pub panic_policy: PanicPolicy,
}

/// Endpoint selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    HealthAware,
}

/// Load balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub strategy: Strategy,

    /// Upstream base URLs. Empty means "use `base_url`".
    pub endpoints: Vec<EndpointConfig>,

    /// Consecutive failures before an endpoint is marked unhealthy.
    pub unhealthy_threshold: u32,

    /// Consecutive successes before an endpoint is marked healthy.
    pub healthy_threshold: u32,

    /// How long an unhealthy endpoint is skipped before it gets a probe.
    pub cooldown_ms: u64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::RoundRobin,
            endpoints: Vec::new(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            cooldown_ms: 10_000,
        }
    }
}

/// One upstream endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Absolute base URL (e.g., "http://10.0.0.5:8080/api").
    pub url: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,

    /// Failures in the closed state before the circuit opens.
    pub failure_threshold: u32,

    /// Half-open successes before the circuit closes.
    pub success_threshold: u32,

    /// Time spent open before probes are admitted, in milliseconds.
    pub open_timeout_ms: u64,

    /// Concurrent probe attempts allowed while half-open.
    pub half_open_max_probes: u32,

    /// 5xx statuses that do not count as failures.
    pub excluded_statuses: Vec<u16>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 3,
            success_threshold: 1,
            open_timeout_ms: 10_000,
            half_open_max_probes: 1,
            excluded_statuses: vec![501],
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub count: u32,

    /// Minimum backoff delay in milliseconds.
    pub wait_ms: u64,

    /// Maximum backoff delay in milliseconds.
    pub max_wait_ms: u64,

    /// Retry on 429, 5xx (except 501), connection errors and open circuits.
    pub default_conditions: bool,

    /// Only retry idempotent methods.
    pub idempotent_only: bool,

    /// Honour `Retry-After` on 429 and 503.
    pub respect_retry_after: bool,

    /// Share of calls that may be retried per window (retry budget).
    /// e.g., 0.1 for 10% budget. Unset disables the budget.
    pub budget_ratio: Option<f64>,

    /// Retries always allowed per window, whatever the ratio.
    pub budget_min_per_window: u64,

    /// Budget window in milliseconds.
    pub budget_window_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: 0,
            wait_ms: 100,
            max_wait_ms: 2000,
            default_conditions: true,
            idempotent_only: false,
            respect_retry_after: true,
            budget_ratio: None,
            budget_min_per_window: 10,
            budget_window_ms: 10_000,
        }
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Follow redirects at all.
    pub follow: bool,

    /// Redirects followed before the call fails.
    pub max_redirects: usize,

    /// Hosts redirects may lead to. Empty allows any host.
    pub allowed_domains: Vec<String>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow: true,
            max_redirects: 10,
            allowed_domains: Vec::new(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: Option<u64>,

    /// Per-attempt timeout (all redirect hops of one attempt) in milliseconds.
    pub attempt_ms: Option<u64>,

    /// Whole-call timeout, backoff included, in milliseconds.
    pub call_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: Some(5_000),
            attempt_ms: None,
            call_ms: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Record metrics through the installed recorder.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
        }
    }
}

/// Panic handling at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    /// Run panic hooks, then return [`Error::Panicked`](crate::Error::Panicked).
    #[default]
    Capture,
    /// Run panic hooks, then continue unwinding.
    Resume,
}
