//! Redirect following.
//!
//! # Responsibilities
//! - Follow 301/302/303/307/308 hop by hop above the transport
//! - Consult every registered [`RedirectPolicy`] before each follow-up hop
//! - Record a history entry per redirect response, newest first
//! - Rewrite method and headers for the next hop
//!
//! # Hop Rules
//! ```text
//! 303                 → GET, body and content headers dropped
//! 301/302 after POST  → GET, body and content headers dropped
//! 307/308             → method and body preserved (body must be replayable)
//! cross-origin        → authorization, cookie, proxy-authorization stripped
//! no Location header  → the 3xx is returned as the final response
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use http::header::{
    HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, PROXY_AUTHORIZATION,
};
use http::{Method, StatusCode};
use url::Url;

use crate::error::Error;
use crate::http::transport::{PreparedRequest, RawResponse, Transport};
use crate::lifecycle::CancelToken;
use crate::observability::metrics;

/// One redirect response observed while following a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHistoryEntry {
    /// URL that answered with the redirect.
    pub url: String,
    pub status: StatusCode,
    pub received_at: SystemTime,
}

/// What a policy sees before the next hop.
#[derive(Debug)]
pub struct RedirectContext<'a> {
    /// Method the next hop will use.
    pub method: &'a Method,
    /// URLs already requested in this chain, oldest first.
    pub via: &'a [Url],
    pub status: StatusCode,
    pub next: &'a Url,
}

#[derive(Debug)]
pub enum RedirectDecision {
    Follow,
    /// Return the redirect response as the final response.
    Stop,
    Fail(Error),
}

pub trait RedirectPolicy: Send + Sync + std::fmt::Debug {
    fn check(&self, ctx: &RedirectContext<'_>) -> RedirectDecision;
}

/// Never follow; the 3xx response is returned to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRedirect;

impl RedirectPolicy for NoRedirect {
    fn check(&self, _ctx: &RedirectContext<'_>) -> RedirectDecision {
        RedirectDecision::Stop
    }
}

/// Follow up to `max` redirects, then fail.
#[derive(Debug, Clone, Copy)]
pub struct FlexibleRedirect {
    max: usize,
}

impl FlexibleRedirect {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Default for FlexibleRedirect {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RedirectPolicy for FlexibleRedirect {
    fn check(&self, ctx: &RedirectContext<'_>) -> RedirectDecision {
        if ctx.via.len() >= self.max {
            return RedirectDecision::Fail(Error::RedirectLimitExceeded {
                method: ctx.method.clone(),
                url: ctx.next.to_string(),
                hops: self.max,
            });
        }
        RedirectDecision::Follow
    }
}

/// Only follow redirects to the listed hosts.
#[derive(Debug, Clone, Default)]
pub struct DomainCheckRedirect {
    hosts: HashSet<String>,
}

impl DomainCheckRedirect {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl RedirectPolicy for DomainCheckRedirect {
    fn check(&self, ctx: &RedirectContext<'_>) -> RedirectDecision {
        let host = ctx.next.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.hosts.contains(&host) {
            RedirectDecision::Follow
        } else {
            RedirectDecision::Fail(Error::RedirectNotAllowed { host })
        }
    }
}

/// Registered policies, combined by AND: the first non-`Follow` verdict wins.
#[derive(Debug, Clone)]
pub struct RedirectPolicies {
    policies: Vec<Arc<dyn RedirectPolicy>>,
}

impl Default for RedirectPolicies {
    fn default() -> Self {
        Self {
            policies: vec![Arc::new(FlexibleRedirect::default())],
        }
    }
}

impl RedirectPolicies {
    pub fn new(policies: Vec<Arc<dyn RedirectPolicy>>) -> Self {
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn evaluate(&self, ctx: &RedirectContext<'_>) -> RedirectDecision {
        for policy in &self.policies {
            match policy.check(ctx) {
                RedirectDecision::Follow => continue,
                verdict => return verdict,
            }
        }
        RedirectDecision::Follow
    }
}

/// Final hop of one attempt.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub raw: RawResponse,
    pub url: Url,
    pub method: Method,
    pub history: Vec<RedirectHistoryEntry>,
    pub started: Instant,
}

/// A failed chain, with the last redirect exchange when one was received.
#[derive(Debug)]
pub(crate) struct HopFailure {
    pub error: Error,
    pub last: Option<Box<Exchange>>,
}

impl From<Error> for HopFailure {
    fn from(error: Error) -> Self {
        Self { error, last: None }
    }
}

/// Send `request`, following redirects as the policies allow.
pub(crate) async fn follow(
    transport: &dyn Transport,
    policies: &RedirectPolicies,
    mut request: PreparedRequest,
    replayable: bool,
    cancel: &CancelToken,
) -> Result<Exchange, HopFailure> {
    let started = Instant::now();
    let mut via: Vec<Url> = Vec::new();
    let mut history: Vec<RedirectHistoryEntry> = Vec::new();

    loop {
        let raw = transport
            .send(request.clone(), cancel)
            .await
            .map_err(Error::from)?;

        let location = redirect_location(&raw.headers);
        let location = match location {
            Some(location) if is_redirect_status(raw.status) => location,
            _ => {
                return Ok(Exchange {
                    raw,
                    url: request.url,
                    method: request.method,
                    history,
                    started,
                })
            }
        };

        let next = request
            .url
            .join(&location)
            .map_err(|_| Error::InvalidRedirectLocation {
                location: location.clone(),
            })?;
        let next_method = redirect_method(&request.method, raw.status);

        history.insert(
            0,
            RedirectHistoryEntry {
                url: request.url.to_string(),
                status: raw.status,
                received_at: SystemTime::now(),
            },
        );
        via.push(request.url.clone());
        metrics::record_redirect(raw.status.as_u16());

        let verdict = policies.evaluate(&RedirectContext {
            method: &next_method,
            via: &via,
            status: raw.status,
            next: &next,
        });
        let exchange = |raw: RawResponse, request: PreparedRequest, history| Exchange {
            raw,
            url: request.url,
            method: request.method,
            history,
            started,
        };
        match verdict {
            RedirectDecision::Follow => {}
            RedirectDecision::Stop => return Ok(exchange(raw, request, history)),
            RedirectDecision::Fail(error) => {
                tracing::warn!(
                    url = %request.url,
                    next = %next,
                    hops = via.len(),
                    error = %error,
                    "redirect rejected by policy"
                );
                return Err(HopFailure {
                    error,
                    last: Some(Box::new(exchange(raw, request, history))),
                });
            }
        }

        tracing::debug!(from = %request.url, to = %next, status = %raw.status, "following redirect");

        let method_changed_to_get = next_method != request.method && next_method == Method::GET;
        if method_changed_to_get {
            request.body = None;
        } else if request.body.is_some() && !replayable {
            return Err(Error::BodyNotReplayable {
                method: request.method.clone(),
                url: next.to_string(),
            }
            .into());
        }
        sanitize_headers_for_redirect(
            &mut request.headers,
            method_changed_to_get,
            same_origin(&request.url, &next),
        );
        request.method = next_method;
        request.url = next;
    }
}

pub fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

pub(crate) fn redirect_method(method: &Method, status: StatusCode) -> Method {
    match status {
        StatusCode::SEE_OTHER if *method != Method::HEAD => Method::GET,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => Method::GET,
        _ => method.clone(),
    }
}

fn redirect_location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub(crate) fn same_origin(left: &Url, right: &Url) -> bool {
    left.scheme().eq_ignore_ascii_case(right.scheme())
        && left
            .host_str()
            .unwrap_or_default()
            .eq_ignore_ascii_case(right.host_str().unwrap_or_default())
        && left.port_or_known_default() == right.port_or_known_default()
}

fn sanitize_headers_for_redirect(
    headers: &mut HeaderMap,
    method_changed_to_get: bool,
    same_origin_redirect: bool,
) {
    if method_changed_to_get {
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
    }
    if !same_origin_redirect {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove(PROXY_AUTHORIZATION);
    }
}
