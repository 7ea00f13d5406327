//! Retry backoff policy for retryable extraction errors.

use std::time::Duration;

use graphtap_types::error::{BackoffClass, ExtractError};

const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Compute retry delay based on error hints and attempt number (1-based).
#[must_use]
pub fn compute_backoff(err: &ExtractError, attempt: u32) -> Duration {
    // Upstream retry hints win.
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.backoff_class {
        BackoffClass::Normal => BACKOFF_NORMAL_BASE_MS,
        BackoffClass::Slow => BACKOFF_SLOW_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
