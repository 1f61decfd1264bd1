//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream base URL with its weight
//! - Track passive health (Healthy/Unhealthy) from attempt outcomes
//! - Count selections for observability

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use url::Url;

use crate::error::{Error, Result};

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A single upstream endpoint.
#[derive(Debug)]
pub struct Endpoint {
    url: Url,
    weight: u32,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    selections: AtomicU64,
    unhealthy_since: Mutex<Option<Instant>>,
}

impl Endpoint {
    pub fn new(url: Url, weight: u32) -> Self {
        Self {
            url,
            weight: weight.max(1),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            selections: AtomicU64::new(0),
            unhealthy_since: Mutex::new(None),
        }
    }

    /// Parse an absolute http(s) base URL.
    pub fn parse(url: &str, weight: u32) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|err| Error::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: "endpoint must be an absolute http(s) url".to_string(),
            });
        }
        Ok(Self::new(parsed, weight))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if endpoint is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Healthy, or unhealthy for longer than `cooldown` and due a probe.
    pub fn is_eligible(&self, cooldown: Duration) -> bool {
        if self.is_healthy() {
            return true;
        }
        let since = *self
            .unhealthy_since
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        since.map_or(true, |since| since.elapsed() >= cooldown)
    }

    /// Like `is_eligible`, but an unhealthy endpoint past its cooldown is
    /// claimed by this caller: the cooldown restarts, so only one caller per
    /// cooldown window gets the probe.
    pub fn try_acquire(&self, cooldown: Duration) -> bool {
        if self.is_healthy() {
            return true;
        }
        let mut since = self
            .unhealthy_since
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if since.map_or(true, |since| since.elapsed() >= cooldown) {
            *since = Some(Instant::now());
            return true;
        }
        false
    }

    pub fn selections(&self) -> u64 {
        self.selections.load(Ordering::Relaxed)
    }

    pub(crate) fn record_selection(&self) {
        self.selections.fetch_add(1, Ordering::Relaxed);
    }

    /// Report a successful attempt. Returns true on a transition to Healthy.
    pub fn mark_success(&self, healthy_threshold: u32) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            *self
                .unhealthy_since
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            return true;
        }
        false
    }

    /// Report a failed attempt. Returns true on a transition to Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: u32) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        let mut since = self
            .unhealthy_since
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.health() == HealthState::Unhealthy {
            // A failed probe restarts the cooldown.
            *since = Some(Instant::now());
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            *since = Some(Instant::now());
            return true;
        }
        false
    }
}
