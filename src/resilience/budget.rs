//! Retry budget.
//!
//! Caps retries to a fraction of the calls started in a rolling window, plus a
//! fixed floor so low-traffic clients can still retry.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RetryConfig;

#[derive(Debug)]
struct BudgetState {
    window_started_at: Instant,
    calls: u64,
    retries: u64,
}

#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    min_per_window: u64,
    window: Duration,
    state: Mutex<BudgetState>,
}

impl RetryBudget {
    pub fn new(ratio: f64, min_per_window: u64, window: Duration) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
            min_per_window,
            window: window.max(Duration::from_millis(1)),
            state: Mutex::new(BudgetState {
                window_started_at: Instant::now(),
                calls: 0,
                retries: 0,
            }),
        }
    }

    /// `None` when the config has no budget ratio.
    pub fn from_config(config: &RetryConfig) -> Option<Self> {
        config.budget_ratio.map(|ratio| {
            Self::new(
                ratio,
                config.budget_min_per_window,
                Duration::from_millis(config.budget_window_ms),
            )
        })
    }

    /// Count a new call against the window.
    pub fn record_call(&self) {
        let mut state = self.lock();
        self.refresh(&mut state);
        state.calls = state.calls.saturating_add(1);
    }

    /// Take one retry from the budget; `false` when it is spent.
    pub fn try_consume(&self) -> bool {
        let mut state = self.lock();
        self.refresh(&mut state);
        let allowance = ((state.calls as f64) * self.ratio).floor() as u64;
        if state.retries >= allowance.saturating_add(self.min_per_window) {
            return false;
        }
        state.retries += 1;
        true
    }

    fn refresh(&self, state: &mut BudgetState) {
        if state.window_started_at.elapsed() >= self.window {
            state.window_started_at = Instant::now();
            state.calls = 0;
            state.retries = 0;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
