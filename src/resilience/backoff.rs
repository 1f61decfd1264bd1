//! Exponential backoff with jitter.

use std::time::Duration;

use http::header::{HeaderMap, RETRY_AFTER};
use rand::Rng;

/// Delay before retry number `retry` (1-based).
///
/// Equal jitter over the next exponential step: the ceiling is
/// `base * 2^retry` capped at `max`, half of it is fixed and the other half
/// random. The result always lies within `[base, max]`.
pub fn calculate_backoff(retry: u32, base: Duration, max: Duration) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }
    let max = max.max(base);
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let ceiling = base_ms
        .saturating_mul(2u64.saturating_pow(retry))
        .min(max_ms);

    let half = ceiling / 2;
    let jitter = if ceiling > half {
        rand::thread_rng().gen_range(0..=ceiling - half)
    } else {
        0
    };

    Duration::from_millis(half + jitter).clamp(base, max)
}

/// Server-requested delay from a delta-seconds `Retry-After` header.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}
