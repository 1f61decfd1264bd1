//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a single attempt (all of its redirect hops) by the attempt timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Attempt timeouts are distinct from call deadlines: they are retryable
//!   connection-class errors, while a call deadline is terminal

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Drive `fut`, failing with [`Error::AttemptTimeout`] if it takes longer than `timeout`.
pub async fn within<F: Future>(timeout: Option<Duration>, fut: F) -> Result<F::Output> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::AttemptTimeout { timeout }),
        None => Ok(fut.await),
    }
}
