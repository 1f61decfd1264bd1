//! Circuit breaker shared across calls.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: upstream assumed down, attempts fail fast
//! - Half-Open: a limited number of probe attempts test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: open_timeout elapsed, observed on the next admission check
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Failure classification is a list of OR'ed policies over the attempt outcome
//! - A closed-state failure older than `open_timeout` starts a fresh count
//! - Every transition bumps a generation; an outcome only counts against the
//!   generation that admitted its attempt
//! - The mutex guards counters and timestamps only, never an exchange

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use http::StatusCode;
use tokio::sync::watch;

use crate::config::CircuitBreakerConfig;
use crate::error::{Error, Result};
use crate::http::Response;
use crate::observability::metrics;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Decides whether an attempt outcome counts as a failure.
pub type FailurePolicy = Arc<dyn Fn(Option<&Response>, Option<&Error>) -> bool + Send + Sync>;

/// 5xx responses count as failures, except the listed statuses.
pub fn server_error_policy(excluded: &[u16]) -> FailurePolicy {
    let excluded: Vec<u16> = excluded.to_vec();
    Arc::new(move |response: Option<&Response>, _: Option<&Error>| {
        response.map_or(false, |response| {
            let status: StatusCode = response.status();
            status.is_server_error() && !excluded.contains(&status.as_u16())
        })
    })
}

/// Connection-level failures and attempt timeouts count as failures.
pub fn transport_error_policy() -> FailurePolicy {
    Arc::new(|_: Option<&Response>, error: Option<&Error>| {
        error.map_or(false, Error::is_connection_error)
    })
}

#[derive(Debug)]
struct Counters {
    failures: u32,
    successes: u32,
    probes_in_flight: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
    generation: u64,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
    half_open_max_probes: u32,
    policies: Vec<FailurePolicy>,
    state: AtomicU8,
    counters: Mutex<Counters>,
    events: watch::Sender<CircuitState>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.current())
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("open_timeout", &self.open_timeout)
            .field("half_open_max_probes", &self.half_open_max_probes)
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// Threshold 3 failures, 1 success, 10s open timeout, one half-open probe,
    /// 5xx (except 501) and connection errors count as failures.
    pub fn new() -> Self {
        let (events, _) = watch::channel(CircuitState::Closed);
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            open_timeout: Duration::from_secs(10),
            half_open_max_probes: 1,
            policies: vec![server_error_policy(&[501]), transport_error_policy()],
            state: AtomicU8::new(CircuitState::Closed as u8),
            counters: Mutex::new(Counters {
                failures: 0,
                successes: 0,
                probes_in_flight: 0,
                last_failure: None,
                last_transition: Instant::now(),
                generation: 0,
            }),
            events,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new()
            .failure_threshold(config.failure_threshold)
            .success_threshold(config.success_threshold)
            .open_timeout(Duration::from_millis(config.open_timeout_ms))
            .half_open_max_probes(config.half_open_max_probes)
            .policies(vec![
                server_error_policy(&config.excluded_statuses),
                transport_error_policy(),
            ])
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn half_open_max_probes(mut self, probes: u32) -> Self {
        self.half_open_max_probes = probes.max(1);
        self
    }

    /// Replace the failure policies.
    pub fn policies(mut self, policies: Vec<FailurePolicy>) -> Self {
        self.policies = policies;
        self
    }

    pub fn add_policy(mut self, policy: FailurePolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Current state, moving Open to Half-Open once the open timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let current = self.current();
        if current != CircuitState::Open {
            return current;
        }
        let mut counters = self.lock();
        if self.current() == CircuitState::Open
            && counters.last_transition.elapsed() >= self.open_timeout
        {
            self.apply(&mut counters, CircuitState::HalfOpen);
        }
        self.current()
    }

    /// Number of state transitions so far.
    pub fn transitions(&self) -> u64 {
        self.lock().generation
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.events.subscribe()
    }

    /// Admit an attempt, or fail fast with [`Error::CircuitOpen`].
    pub fn allow(self: &Arc<Self>) -> Result<Admission> {
        match self.state() {
            CircuitState::Closed => {
                let counters = self.lock();
                if self.current() != CircuitState::Closed {
                    drop(counters);
                    return self.allow();
                }
                Ok(self.admission(CircuitState::Closed, counters.generation))
            }
            CircuitState::Open => {
                let elapsed = self.lock().last_transition.elapsed();
                Err(Error::CircuitOpen {
                    retry_after: self.open_timeout.saturating_sub(elapsed),
                })
            }
            CircuitState::HalfOpen => {
                let mut counters = self.lock();
                if self.current() != CircuitState::HalfOpen {
                    drop(counters);
                    return self.allow();
                }
                if counters.probes_in_flight >= self.half_open_max_probes {
                    return Err(Error::CircuitOpen {
                        retry_after: Duration::ZERO,
                    });
                }
                counters.probes_in_flight += 1;
                Ok(self.admission(CircuitState::HalfOpen, counters.generation))
            }
        }
    }

    /// Record an outcome against the current state.
    pub fn feedback(&self, response: Option<&Response>, error: Option<&Error>) {
        let failed = self.is_failure(response, error);
        let mut counters = self.lock();
        let state = self.current();
        self.record(&mut counters, state, failed);
    }

    fn is_failure(&self, response: Option<&Response>, error: Option<&Error>) -> bool {
        self.policies.iter().any(|policy| policy(response, error))
    }

    fn admission(self: &Arc<Self>, admitted_in: CircuitState, generation: u64) -> Admission {
        Admission {
            breaker: Arc::clone(self),
            admitted_in,
            generation,
            completed: false,
        }
    }

    fn complete(&self, admitted_in: CircuitState, generation: u64, outcome: Option<bool>) {
        let mut counters = self.lock();
        if admitted_in == CircuitState::HalfOpen {
            counters.probes_in_flight = counters.probes_in_flight.saturating_sub(1);
        }
        let Some(failed) = outcome else {
            return;
        };
        if counters.generation != generation {
            tracing::debug!(
                admitted_in = %admitted_in,
                current = %self.current(),
                "ignoring circuit feedback from a previous state"
            );
            return;
        }
        self.record(&mut counters, admitted_in, failed);
    }

    fn record(&self, counters: &mut Counters, state: CircuitState, failed: bool) {
        match (state, failed) {
            (CircuitState::Closed, true) => {
                let now = Instant::now();
                if let Some(last_failure) = counters.last_failure {
                    if now.saturating_duration_since(last_failure) > self.open_timeout {
                        counters.failures = 0;
                    }
                }
                counters.failures += 1;
                counters.last_failure = Some(now);
                if counters.failures >= self.failure_threshold {
                    self.apply(counters, CircuitState::Open);
                }
            }
            (CircuitState::Closed, false) => {
                counters.failures = 0;
                counters.last_failure = None;
            }
            (CircuitState::HalfOpen, true) => self.apply(counters, CircuitState::Open),
            (CircuitState::HalfOpen, false) => {
                counters.successes += 1;
                if counters.successes >= self.success_threshold {
                    self.apply(counters, CircuitState::Closed);
                }
            }
            (CircuitState::Open, _) => {}
        }
    }

    /// Switch state. Caller holds the counters lock.
    fn apply(&self, counters: &mut Counters, to: CircuitState) {
        let from = self.current();
        if from == to {
            return;
        }
        counters.failures = 0;
        counters.successes = 0;
        counters.last_failure = None;
        counters.last_transition = Instant::now();
        counters.generation += 1;
        self.state.store(to as u8, Ordering::Release);
        self.events.send_replace(to);

        match to {
            CircuitState::Open => tracing::warn!(from = %from, to = %to, "circuit breaker opened"),
            _ => tracing::info!(from = %from, to = %to, "circuit breaker state changed"),
        }
        metrics::record_circuit_transition(from, to);
    }

    fn current(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission for one attempt. Dropping it without [`complete`](Admission::complete)
/// frees the probe slot and records nothing.
#[derive(Debug)]
pub struct Admission {
    breaker: Arc<CircuitBreaker>,
    admitted_in: CircuitState,
    generation: u64,
    completed: bool,
}

impl Admission {
    pub fn admitted_in(&self) -> CircuitState {
        self.admitted_in
    }

    pub fn complete(mut self, response: Option<&Response>, error: Option<&Error>) {
        let failed = self.breaker.is_failure(response, error);
        self.breaker
            .complete(self.admitted_in, self.generation, Some(failed));
        self.completed = true;
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.complete(self.admitted_in, self.generation, None);
        }
    }
}
