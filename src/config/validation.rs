//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs, header names and values
//! - Validate value ranges (thresholds > 0, wait <= max wait, ratio in [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use http::header::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid url {url:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("retries.wait_ms ({wait_ms}) exceeds retries.max_wait_ms ({max_wait_ms})")]
    WaitExceedsMax { wait_ms: u64, max_wait_ms: u64 },

    #[error("retries.budget_ratio must be within [0, 1]")]
    BudgetRatioOutOfRange,

    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    #[error("circuit_breaker.excluded_statuses: {status} is not a valid status code")]
    InvalidStatus { status: u16 },

    #[error("observability.log_level: unknown level {level:?}")]
    UnknownLogLevel { level: String },
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(base_url) = &config.base_url {
        check_url("base_url", base_url, &mut errors);
    }

    for (name, value) in &config.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err()
        {
            errors.push(ValidationError::InvalidHeader { name: name.clone() });
        }
    }
    if let Some(user_agent) = &config.user_agent {
        if HeaderValue::from_str(user_agent).is_err() {
            errors.push(ValidationError::InvalidHeader {
                name: "user-agent".to_string(),
            });
        }
    }

    let lb = &config.load_balancer;
    for endpoint in &lb.endpoints {
        check_url("load_balancer.endpoints", &endpoint.url, &mut errors);
        if endpoint.weight == 0 {
            errors.push(ValidationError::Zero {
                field: "load_balancer.endpoints.weight",
            });
        }
    }
    check_positive("load_balancer.unhealthy_threshold", lb.unhealthy_threshold, &mut errors);
    check_positive("load_balancer.healthy_threshold", lb.healthy_threshold, &mut errors);

    let cb = &config.circuit_breaker;
    check_positive("circuit_breaker.failure_threshold", cb.failure_threshold, &mut errors);
    check_positive("circuit_breaker.success_threshold", cb.success_threshold, &mut errors);
    check_positive("circuit_breaker.half_open_max_probes", cb.half_open_max_probes, &mut errors);
    for status in &cb.excluded_statuses {
        if http::StatusCode::from_u16(*status).is_err() {
            errors.push(ValidationError::InvalidStatus { status: *status });
        }
    }

    let retries = &config.retries;
    if retries.wait_ms > retries.max_wait_ms {
        errors.push(ValidationError::WaitExceedsMax {
            wait_ms: retries.wait_ms,
            max_wait_ms: retries.max_wait_ms,
        });
    }
    if let Some(ratio) = retries.budget_ratio {
        if !(0.0..=1.0).contains(&ratio) {
            errors.push(ValidationError::BudgetRatioOutOfRange);
        }
    }

    if config.redirects.follow && config.redirects.max_redirects == 0 {
        errors.push(ValidationError::Zero {
            field: "redirects.max_redirects",
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error" | "off") {
        errors.push(ValidationError::UnknownLogLevel {
            level: config.observability.log_level.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(field: &'static str, url: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
        Ok(_) => errors.push(ValidationError::InvalidUrl {
            field,
            url: url.to_string(),
            reason: "expected an absolute http(s) url".to_string(),
        }),
        Err(err) => errors.push(ValidationError::InvalidUrl {
            field,
            url: url.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn check_positive(field: &'static str, value: u32, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}
