//! Cancellation tokens and call deadlines.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::select_all;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Level-triggered cancellation signal.
///
/// Cloning shares the signal. A [`child`](CancelToken::child) observes its own
/// signal and every ancestor's, so cancelling a parent cancels all children.
#[derive(Debug, Clone)]
pub struct CancelToken {
    /// This token's sender first, followed by its ancestors.
    chain: Vec<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// Create a new, un-cancelled token.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            chain: vec![Arc::new(tx)],
        }
    }

    /// Create a token that is cancelled along with `self`.
    pub fn child(&self) -> Self {
        let (tx, _) = watch::channel(false);
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(Arc::new(tx));
        chain.extend(self.chain.iter().cloned());
        Self { chain }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.chain[0].send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.chain.iter().any(|tx| *tx.borrow())
    }

    /// Resolve once this token or any ancestor is cancelled.
    pub async fn canceled(&self) {
        let mut receivers: Vec<_> = self.chain.iter().map(|tx| tx.subscribe()).collect();
        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                // The sender lives as long as `self`, so this only resolves on `true`.
                let _ = rx.wait_for(|canceled| *canceled).await;
            })
        });
        select_all(waits).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call cancellation scope: a token plus an optional absolute deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancelToken,
    deadline: Option<Instant>,
    budget: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing token, e.g. one shared with other work.
    pub fn with_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bound the whole call, backoff included, to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self.budget = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.budget = Some(deadline.saturating_duration_since(Instant::now()));
        self.deadline = Some(deadline);
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Re-parent the token under `parent` so both signals apply.
    pub(crate) fn link(&mut self, parent: &CancelToken) {
        let mut chain = self.cancel.chain.clone();
        for tx in &parent.chain {
            if !chain.iter().any(|existing| Arc::ptr_eq(existing, tx)) {
                chain.push(tx.clone());
            }
        }
        self.cancel = CancelToken { chain };
    }

    /// Fail if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            return Err(Error::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(self.deadline_error());
            }
        }
        Ok(())
    }

    /// Drive `fut` unless cancellation or the deadline fires first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.canceled() => Err(Error::Canceled),
            _ = wait_deadline(self.deadline) => Err(self.deadline_error()),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(tokio::time::sleep(duration)).await
    }

    fn deadline_error(&self) -> Error {
        Error::DeadlineExceeded {
            deadline: self.budget.unwrap_or_default(),
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}
