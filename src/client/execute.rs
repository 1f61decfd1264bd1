//! Call execution: the attempt loop and the per-attempt pipeline.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::Instrument;

use crate::client::Client;
use crate::config::PanicPolicy;
use crate::error::{Error, Result};
use crate::http::redirect::{self, Exchange, HopFailure};
use crate::http::response::AttemptInfo;
use crate::http::{PreparedRequest, Request, Response};
use crate::lifecycle::CallContext;
use crate::load_balancer::Endpoint;
use crate::observability::{metrics, tracing as spans};
use crate::resilience::{outcome_parts, within, RetryEvent};

impl Client {
    /// Run `request` through the full pipeline.
    ///
    /// Returns the final response, or the error that ended the call. A response
    /// with an error status is not an error. Exactly one group of hooks runs.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        request.context.link(&self.shutdown);
        if request.context.deadline().is_none() {
            if let Some(timeout) = self.call_timeout {
                request.context = request.context.clone().with_timeout(timeout);
            }
        }

        let span = spans::call_span(&request);
        let started = Instant::now();
        let method = request.method.to_string();

        let outcome = AssertUnwindSafe(self.run_attempts(&mut request))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        let _entered = span.enter();

        match outcome {
            Ok(Ok(response)) => {
                tracing::debug!(
                    status = %response.status(),
                    attempt = response.attempt(),
                    "call succeeded"
                );
                metrics::record_call(&method, "success", started);
                self.hooks.run_success(self, &response);
                Ok(response)
            }
            Ok(Err(error)) => {
                tracing::warn!(attempt = request.attempt, error = %error, "call failed");
                metrics::record_call(&method, "error", started);
                self.hooks.run_error(&request, &error);
                Err(error)
            }
            Err(payload) => {
                let error = Error::Panicked {
                    message: panic_message(payload.as_ref()),
                };
                tracing::error!(error = %error, "call panicked");
                metrics::record_call(&method, "panic", started);
                self.hooks.run_panic(&request, &error);
                match self.panic_policy {
                    PanicPolicy::Capture => Err(error),
                    PanicPolicy::Resume => std::panic::resume_unwind(payload),
                }
            }
        }
    }

    async fn run_attempts(&self, request: &mut Request) -> Result<Response> {
        let policy = self.retry.with_overrides(&request.overrides);
        let max_attempts = policy.max_attempts(&request.method);
        let ctx = request.context.clone();
        if let Some(budget) = &self.retry_budget {
            budget.record_call();
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.check()?;
            request.attempt = attempt;

            let span = spans::attempt_span(request);
            let result = self.run_attempt(request, &ctx).instrument(span).await;

            if let Err(error) = &result {
                if error.is_terminal() {
                    return result;
                }
            }
            let (response, error) = outcome_parts(&result);
            if attempt >= max_attempts || !policy.should_retry(response, error) {
                return result;
            }

            if request.body.is_consumed() {
                tracing::warn!(attempt, "retry needs the request body again, but it was single-use");
                return Err(Error::BodyNotReplayable {
                    method: request.method.clone(),
                    url: request.url.clone(),
                });
            }
            if let Some(budget) = &self.retry_budget {
                if !budget.try_consume() {
                    tracing::warn!(attempt, "retry budget exhausted, returning last outcome");
                    return result;
                }
            }

            let delay = policy.backoff(attempt, response);
            policy.notify(&RetryEvent {
                trace_id: request.trace_id,
                attempt,
                max_attempts,
                delay,
                response,
                error,
            });
            tracing::info!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                status = response.map(|r| r.status().as_u16()),
                error = error.map(|e| e.to_string()),
                "retrying"
            );
            metrics::record_retry();
            drop(result);

            ctx.sleep(delay).await?;
        }
    }

    async fn run_attempt(&self, request: &mut Request, ctx: &CallContext) -> Result<Response> {
        let endpoint = self.select_endpoint(request)?;
        let base = endpoint
            .as_ref()
            .map(|endpoint| endpoint.url().clone())
            .or_else(|| self.base_url.clone());
        request.resolved_url = Some(request.resolve(base.as_ref())?);
        request.endpoint = base;

        let admission = match &self.circuit_breaker {
            Some(breaker) => Some(breaker.allow()?),
            None => None,
        };

        self.middleware.run_request(self, request)?;

        let url = match &request.resolved_url {
            Some(url) => url.clone(),
            None => request.resolve(request.endpoint.as_ref())?,
        };
        let body = request
            .body
            .take_payload()
            .map_err(|_| Error::BodyNotReplayable {
                method: request.method.clone(),
                url: url.to_string(),
            })?;
        let prepared = PreparedRequest {
            method: request.method.clone(),
            url,
            headers: request.headers.clone(),
            body,
        };

        let timeout = request.overrides.timeout.or(self.attempt_timeout);
        let exchange = ctx
            .run(within(
                timeout,
                redirect::follow(
                    self.transport.as_ref(),
                    &self.redirects,
                    prepared,
                    request.body.is_replayable(),
                    ctx.token(),
                ),
            ))
            .await;

        let result = match exchange {
            // Cancellation says nothing about the upstream: no feedback.
            Err(error) => return Err(error),
            Ok(Err(timeout)) => Err(timeout),
            Ok(Ok(Err(HopFailure { error, last }))) => match last {
                Some(last) => Err(error.with_response(self.build_response(request, *last))),
                None => Err(error),
            },
            Ok(Ok(Ok(exchange))) => {
                let mut response = self.build_response(request, exchange);
                match self.middleware.run_response(self, &mut response) {
                    Ok(()) => Ok(response),
                    Err(error) => Err(error.with_response(response)),
                }
            }
        };
        let canceled = ctx.token().is_canceled();
        // A bare error after cancellation may be the transport giving up.
        let observed = match &result {
            Ok(_) => true,
            Err(error) => !canceled || error.response().is_some(),
        };

        let (response, error) = outcome_parts(&result);
        if observed {
            if let Some(admission) = admission {
                admission.complete(response, error);
            }
            if let (Some(lb), Some(endpoint)) = (&self.load_balancer, &endpoint) {
                lb.feedback(endpoint, response, error);
            }
            metrics::record_attempt(match (response, error) {
                (_, Some(_)) => "error",
                (Some(_), None) => "response",
                (None, None) => "unknown",
            });
        }

        if canceled {
            return Err(Error::Canceled);
        }
        result
    }

    fn select_endpoint(&self, request: &Request) -> Result<Option<Arc<Endpoint>>> {
        if request.is_absolute() {
            return Ok(None);
        }
        match &self.load_balancer {
            Some(lb) => lb.next().map(Some),
            None => Ok(None),
        }
    }

    fn build_response(&self, request: &Request, exchange: Exchange) -> Response {
        let info = AttemptInfo {
            method: exchange.method,
            endpoint: request.endpoint.clone(),
            attempt: request.attempt,
            trace_id: request.trace_id,
            duration: exchange.started.elapsed(),
        };
        Response::from_raw(exchange.raw, exchange.url, info, exchange.history)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
