//! Client construction from configuration, and the per-request builder.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, USER_AGENT};

use crate::client::Client;
use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::error::{Error, Result};
use crate::http::request::parse_header;
use crate::http::{
    Body, DomainCheckRedirect, FlexibleRedirect, HyperTransport, NoRedirect, RedirectPolicy,
    Request, Response, Transport,
};
use crate::lifecycle::CallContext;
use crate::load_balancer::build_load_balancer;
use crate::resilience::{CircuitBreaker, RetryBudget, RetryPolicy};

impl Client {
    /// Build a client from validated configuration over `transport`.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let mut client = Client::new(transport);
        if let Some(base_url) = &config.base_url {
            client.set_base_url(base_url)?;
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }
        if let Some(user_agent) = &config.user_agent {
            let (_, value) = parse_header(USER_AGENT.as_str(), user_agent)?;
            headers.insert(USER_AGENT, value);
        }
        client.set_headers(headers);

        client.set_retry_policy(RetryPolicy::from_config(&config.retries));
        if let Some(budget) = RetryBudget::from_config(&config.retries) {
            client.set_retry_budget(budget);
        }

        let mut redirects: Vec<Arc<dyn RedirectPolicy>> = Vec::new();
        if config.redirects.follow {
            redirects.push(Arc::new(FlexibleRedirect::new(config.redirects.max_redirects)));
            if !config.redirects.allowed_domains.is_empty() {
                redirects.push(Arc::new(DomainCheckRedirect::new(
                    &config.redirects.allowed_domains,
                )));
            }
        } else {
            redirects.push(Arc::new(NoRedirect));
        }
        client.set_redirect_policies(redirects);

        if config.circuit_breaker.enabled {
            client.set_circuit_breaker(CircuitBreaker::from_config(&config.circuit_breaker));
        }
        if let Some(lb) = build_load_balancer(&config.load_balancer)? {
            client.set_load_balancer(lb);
        }

        if let Some(ms) = config.timeouts.attempt_ms {
            client.set_attempt_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = config.timeouts.call_ms {
            client.set_timeout(Duration::from_millis(ms));
        }
        client.set_panic_policy(config.panic_policy);

        tracing::debug!(
            base_url = ?config.base_url,
            retries = config.retries.count,
            circuit_breaker = config.circuit_breaker.enabled,
            endpoints = config.load_balancer.endpoints.len(),
            "client configured"
        );
        Ok(client)
    }

    /// [`from_config`](Client::from_config) over the default hyper transport.
    pub fn with_hyper(config: &ClientConfig) -> Result<Self> {
        let transport = HyperTransport::from_config(&config.timeouts);
        Self::from_config(config, Arc::new(transport))
    }
}

/// Fluent construction of a single request, bound to a client.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Result<Request>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, request: Request) -> Self {
        Self {
            client,
            request: Ok(request),
        }
    }

    fn map(mut self, f: impl FnOnce(Request) -> Result<Request>) -> Self {
        self.request = self.request.and_then(f);
        self
    }

    /// Invalid names or values surface as an error from [`send`](Self::send).
    pub fn header(self, name: &str, value: &str) -> Self {
        let (name, value) = (name.to_string(), value.to_string());
        self.map(move |request| request.header(&name, &value))
    }

    pub fn headers(self, headers: HeaderMap) -> Self {
        self.map(|request| Ok(request.with_headers(headers)))
    }

    pub fn body(self, body: impl Into<Body>) -> Self {
        let body = body.into();
        self.map(|request| Ok(request.with_body(body)))
    }

    /// Single-use payload: a retry or 307/308 hop that needs it again fails.
    pub fn body_once(self, body: impl Into<Bytes>) -> Self {
        let body = Body::once(body);
        self.map(|request| Ok(request.with_body(body)))
    }

    pub fn json<T: serde::Serialize>(self, value: &T) -> Self {
        let encoded = serde_json::to_vec(value).map_err(Error::middleware);
        self.map(|request| {
            let request = request.header("content-type", "application/json")?;
            Ok(request.with_body(encoded?))
        })
    }

    pub fn context(self, context: CallContext) -> Self {
        self.map(|request| Ok(request.with_context(context)))
    }

    /// Per-attempt timeout for this request.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|request| Ok(request.with_timeout(timeout)))
    }

    pub fn retry_count(self, count: u32) -> Self {
        self.map(|request| Ok(request.with_retry_count(count)))
    }

    pub fn retry_wait(self, wait: Duration, max_wait: Duration) -> Self {
        self.map(|request| Ok(request.with_retry_wait(wait, max_wait)))
    }

    pub fn retry_condition<F>(self, condition: F) -> Self
    where
        F: Fn(Option<&Response>, Option<&Error>) -> bool + Send + Sync + 'static,
    {
        self.map(|request| Ok(request.with_retry_condition(Arc::new(condition))))
    }

    pub fn build(self) -> Result<Request> {
        self.request
    }

    pub async fn send(self) -> Result<Response> {
        let request = self.request?;
        self.client.execute(request).await
    }
}
