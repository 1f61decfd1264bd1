//! The client and its request pipeline.
//!
//! # Data Flow
//! ```text
//! Client::execute(Request)
//!     → call span, call context linked to the client's shutdown token
//!     → per attempt (execute.rs):
//!         context check
//!         → load balancer selects endpoint (relative targets only)
//!         → circuit breaker admits, or fails fast
//!         → request middleware
//!         → transport + redirect hops, under the attempt timeout
//!         → response middleware
//!         → breaker and balancer feedback
//!         → retry conditions → hooks → cancellable backoff
//!     → exactly one of: success hooks, error hooks, panic hooks
//! ```
//!
//! # Design Decisions
//! - A clone copies scalar settings and shares the transport, breaker,
//!   balancer and budget; the copy can be reconfigured independently
//! - Everything a call needs is owned by the call; concurrent calls only meet
//!   at the shared components, which synchronise internally
//! - Panics are recovered at the call boundary and never leak past the policy

mod builder;
mod execute;
pub mod hooks;

use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderMap;
use http::Method;
use url::Url;

use crate::config::PanicPolicy;
use crate::error::{Error, Result};
use crate::http::request::parse_header;
use crate::http::{
    MiddlewareChain, RedirectPolicies, RedirectPolicy, Request, RequestMiddleware, Response,
    ResponseMiddleware, Transport,
};
use crate::lifecycle::CancelToken;
use crate::load_balancer::LoadBalancer;
use crate::resilience::{CircuitBreaker, RetryBudget, RetryEvent, RetryPolicy};

pub use builder::RequestBuilder;
pub use hooks::{ErrorHook, Hooks, PanicHook, SuccessHook};

#[derive(Clone)]
pub struct Client {
    base_url: Option<Url>,
    headers: HeaderMap,
    retry: RetryPolicy,
    redirects: RedirectPolicies,
    attempt_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    panic_policy: PanicPolicy,
    middleware: MiddlewareChain,
    hooks: Hooks,
    transport: Arc<dyn Transport>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    load_balancer: Option<Arc<dyn LoadBalancer>>,
    retry_budget: Option<Arc<RetryBudget>>,
    shutdown: CancelToken,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("retry", &self.retry)
            .field("redirects", &self.redirects)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("panic_policy", &self.panic_policy)
            .field("middleware", &self.middleware)
            .field("hooks", &self.hooks)
            .field("transport", &self.transport)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("load_balancer", &self.load_balancer)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client with default policies: no retries, up to 10 redirects, no
    /// breaker, no balancer, and the built-in request middleware.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: None,
            headers: HeaderMap::new(),
            retry: RetryPolicy::default(),
            redirects: RedirectPolicies::default(),
            attempt_timeout: None,
            call_timeout: None,
            panic_policy: PanicPolicy::default(),
            middleware: MiddlewareChain::with_defaults(),
            hooks: Hooks::default(),
            transport,
            circuit_breaker: None,
            load_balancer: None,
            retry_budget: None,
            shutdown: CancelToken::new(),
        }
    }

    // --- Accessors ---

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn redirect_policies(&self) -> &RedirectPolicies {
        &self.redirects
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    pub fn load_balancer(&self) -> Option<&Arc<dyn LoadBalancer>> {
        self.load_balancer.as_ref()
    }

    pub fn panic_policy(&self) -> PanicPolicy {
        self.panic_policy
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_canceled()
    }

    // --- Settings ---

    pub fn set_base_url(&mut self, base_url: &str) -> Result<&mut Self> {
        let url = Url::parse(base_url).map_err(|err| Error::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn set_headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.headers = headers;
        self
    }

    pub fn set_retry_count(&mut self, count: u32) -> &mut Self {
        self.retry.set_count(count);
        self
    }

    pub fn set_retry_wait_time(&mut self, wait: Duration) -> &mut Self {
        self.retry.set_wait(wait);
        self
    }

    pub fn set_retry_max_wait_time(&mut self, max_wait: Duration) -> &mut Self {
        self.retry.set_max_wait(max_wait);
        self
    }

    /// Enable or disable the built-in retry conditions.
    pub fn set_default_retry_conditions(&mut self, enabled: bool) -> &mut Self {
        self.retry.set_default_conditions(enabled);
        self
    }

    pub fn set_retry_idempotent_only(&mut self, enabled: bool) -> &mut Self {
        self.retry.set_idempotent_only(enabled);
        self
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) -> &mut Self {
        self.retry = policy;
        self
    }

    pub fn add_retry_condition<F>(&mut self, condition: F) -> &mut Self
    where
        F: Fn(Option<&Response>, Option<&Error>) -> bool + Send + Sync + 'static,
    {
        self.retry.add_condition(Arc::new(condition));
        self
    }

    pub fn add_retry_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.retry.add_hook(Arc::new(hook));
        self
    }

    pub fn set_retry_budget(&mut self, budget: RetryBudget) -> &mut Self {
        self.retry_budget = Some(Arc::new(budget));
        self
    }

    /// Replace the redirect policies; they are combined by AND.
    pub fn set_redirect_policies(&mut self, policies: Vec<Arc<dyn RedirectPolicy>>) -> &mut Self {
        self.redirects = RedirectPolicies::new(policies);
        self
    }

    pub fn set_redirect_policy(&mut self, policy: impl RedirectPolicy + 'static) -> &mut Self {
        self.set_redirect_policies(vec![Arc::new(policy)])
    }

    pub fn set_circuit_breaker(&mut self, breaker: CircuitBreaker) -> &mut Self {
        self.circuit_breaker = Some(Arc::new(breaker));
        self
    }

    /// Share an existing breaker, e.g. with another client.
    pub fn set_shared_circuit_breaker(&mut self, breaker: Arc<CircuitBreaker>) -> &mut Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn set_load_balancer(&mut self, load_balancer: Arc<dyn LoadBalancer>) -> &mut Self {
        self.load_balancer = Some(load_balancer);
        self
    }

    pub fn add_request_middleware(
        &mut self,
        middleware: impl RequestMiddleware + 'static,
    ) -> &mut Self {
        self.middleware.push_request(Arc::new(middleware));
        self
    }

    pub fn add_response_middleware(
        &mut self,
        middleware: impl ResponseMiddleware + 'static,
    ) -> &mut Self {
        self.middleware.push_response(Arc::new(middleware));
        self
    }

    /// Replace the request chain, built-ins included.
    pub fn set_request_middlewares(
        &mut self,
        middlewares: Vec<Arc<dyn RequestMiddleware>>,
    ) -> &mut Self {
        self.middleware.set_request(middlewares);
        self
    }

    pub fn set_response_middlewares(
        &mut self,
        middlewares: Vec<Arc<dyn ResponseMiddleware>>,
    ) -> &mut Self {
        self.middleware.set_response(middlewares);
        self
    }

    pub fn on_success<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Client, &Response) + Send + Sync + 'static,
    {
        self.hooks.add_success(Arc::new(hook));
        self
    }

    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Error) + Send + Sync + 'static,
    {
        self.hooks.add_error(Arc::new(hook));
        self
    }

    pub fn on_panic<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Error) + Send + Sync + 'static,
    {
        self.hooks.add_panic(Arc::new(hook));
        self
    }

    pub fn set_panic_policy(&mut self, policy: PanicPolicy) -> &mut Self {
        self.panic_policy = policy;
        self
    }

    /// Bound each attempt, redirect hops included.
    pub fn set_attempt_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Bound each call, retries and backoff included, unless the request
    /// brings its own deadline.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Cancel every in-flight and future call, and close the balancer.
    pub fn shutdown(&self) {
        tracing::info!("client shutting down");
        self.shutdown.cancel();
        if let Some(lb) = &self.load_balancer {
            lb.close();
        }
    }

    // --- Requests ---

    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Request::new(method, url))
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }
}
