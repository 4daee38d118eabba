//! Retry classification and backoff schedules.

use crate::config::DirectRetryPolicy;
use crate::error::{DeliveryError, TransportErrorKind};
use rand::Rng;
use std::time::Duration;

/// Upper bound on any single retry wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Whether a failed delivery attempt is transient.
///
/// Rules, in order:
/// 1. a connection-level failure with no response is retryable;
/// 2. any other failure without a response is terminal;
/// 3. a 5xx response is retryable;
/// 4. a 429 response is retryable;
/// 5. everything else is terminal.
pub fn is_retryable(error: &DeliveryError) -> bool {
    match error {
        DeliveryError::Transport { kind, .. } => *kind == TransportErrorKind::Connect,
        DeliveryError::Rejected { status, .. } => (500..=599).contains(status) || *status == 429,
        DeliveryError::Dropped { .. }
        | DeliveryError::Abandoned { .. }
        | DeliveryError::Persistence(_) => false,
    }
}

/// Wait before a durable job's next attempt: `min(30s, 2^attempts s)`.
pub fn durable_backoff(attempts: u32) -> Duration {
    2u64.checked_pow(attempts)
        .and_then(|secs| secs.checked_mul(1_000))
        .map(Duration::from_millis)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Wait before direct-mode retry number `retry` (1-based).
pub(crate) fn direct_delay(policy: &DirectRetryPolicy, retry: u32) -> Duration {
    let base = exponential_delay(policy.base_delay, retry);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..0.2);
    base + base.mul_f64(jitter)
}

fn exponential_delay(base: Duration, retry: u32) -> Duration {
    2u32.checked_pow(retry)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(MAX_BACKOFF)
}
