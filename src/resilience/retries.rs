//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an attempt outcome deserves another attempt
//! - Compute the delay before the next attempt
//! - Notify retry hooks before each backoff sleep
//!
//! # Design Decisions
//! - Conditions are OR'ed: any `true` schedules a retry
//! - Default conditions: 429, 5xx except 501, connection errors, circuit open
//! - Non-idempotent methods are retried unless `idempotent_only` is set
//! - A `Retry-After` on 429/503 replaces the computed delay, capped at `max_wait`

use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::http::{RequestOverrides, Response};
use crate::resilience::backoff::{calculate_backoff, parse_retry_after};

/// Predicate over an attempt outcome. Exactly one of the two is usually set;
/// a response middleware error carries both.
pub type RetryCondition = Arc<dyn Fn(Option<&Response>, Option<&Error>) -> bool + Send + Sync>;

/// Called before the backoff sleep of every retry.
pub type RetryHook = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// What a retry hook is told about the upcoming retry.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub trace_id: Uuid,
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub response: Option<&'a Response>,
    pub error: Option<&'a Error>,
}

/// Split an attempt outcome into the views conditions and policies consume.
pub fn outcome_parts(result: &Result<Response>) -> (Option<&Response>, Option<&Error>) {
    match result {
        Ok(response) => (Some(response), None),
        Err(Error::Response(inner)) => {
            (Some(inner.response.as_ref()), Some(inner.source.as_ref()))
        }
        Err(error) => (None, Some(error)),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

pub fn default_retry_condition(response: Option<&Response>, error: Option<&Error>) -> bool {
    if let Some(error) = error {
        if error.is_connection_error() || error.is_circuit_open() {
            return true;
        }
    }
    response.map_or(false, |response| is_retryable_status(response.status()))
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
    )
}

#[derive(Clone)]
pub struct RetryPolicy {
    count: u32,
    wait: Duration,
    max_wait: Duration,
    default_conditions: bool,
    conditions: Vec<RetryCondition>,
    hooks: Vec<RetryHook>,
    idempotent_only: bool,
    respect_retry_after: bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("count", &self.count)
            .field("wait", &self.wait)
            .field("max_wait", &self.max_wait)
            .field("default_conditions", &self.default_conditions)
            .field("conditions", &self.conditions.len())
            .field("hooks", &self.hooks.len())
            .field("idempotent_only", &self.idempotent_only)
            .field("respect_retry_after", &self.respect_retry_after)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 0,
            wait: Duration::from_millis(100),
            max_wait: Duration::from_millis(2000),
            default_conditions: true,
            conditions: Vec::new(),
            hooks: Vec::new(),
            idempotent_only: false,
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            count: config.count,
            wait: Duration::from_millis(config.wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
            default_conditions: config.default_conditions,
            idempotent_only: config.idempotent_only,
            respect_retry_after: config.respect_retry_after,
            ..Self::default()
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn set_count(&mut self, count: u32) {
        self.count = count;
    }

    pub fn set_wait(&mut self, wait: Duration) {
        self.wait = wait;
    }

    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.max_wait = max_wait;
    }

    pub fn set_default_conditions(&mut self, enabled: bool) {
        self.default_conditions = enabled;
    }

    pub fn set_idempotent_only(&mut self, enabled: bool) {
        self.idempotent_only = enabled;
    }

    pub fn set_respect_retry_after(&mut self, enabled: bool) {
        self.respect_retry_after = enabled;
    }

    pub fn add_condition(&mut self, condition: RetryCondition) {
        self.conditions.push(condition);
    }

    pub fn add_hook(&mut self, hook: RetryHook) {
        self.hooks.push(hook);
    }

    /// Copy with the request's overrides applied on top.
    pub fn with_overrides(&self, overrides: &RequestOverrides) -> Self {
        let mut policy = self.clone();
        if let Some(count) = overrides.retry_count {
            policy.count = count;
        }
        if let Some(wait) = overrides.retry_wait {
            policy.wait = wait;
        }
        if let Some(max_wait) = overrides.retry_max_wait {
            policy.max_wait = max_wait;
        }
        policy
            .conditions
            .extend(overrides.retry_conditions.iter().cloned());
        policy
    }

    /// Total attempts allowed for `method`.
    pub fn max_attempts(&self, method: &Method) -> u32 {
        if self.idempotent_only && !is_idempotent(method) {
            return 1;
        }
        self.count.saturating_add(1)
    }

    pub fn should_retry(&self, response: Option<&Response>, error: Option<&Error>) -> bool {
        if self.default_conditions && default_retry_condition(response, error) {
            return true;
        }
        self.conditions
            .iter()
            .any(|condition| condition(response, error))
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32, response: Option<&Response>) -> Duration {
        if self.respect_retry_after {
            if let Some(response) = response {
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS
                    || status == StatusCode::SERVICE_UNAVAILABLE
                {
                    if let Some(delay) = parse_retry_after(response.headers()) {
                        return delay.min(self.max_wait.max(self.wait));
                    }
                }
            }
        }
        calculate_backoff(retry, self.wait, self.max_wait)
    }

    pub(crate) fn notify(&self, event: &RetryEvent<'_>) {
        for hook in &self.hooks {
            hook(event);
        }
    }
}
