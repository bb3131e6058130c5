//! Doubling backoff helper shared by the upstream session's reconnect
//! logic (C1) and the batch fetcher's per-batch retry logic (C2). Both
//! schedules in the spec are exact doubling sequences with a cap and no
//! jitter, so one small helper covers both rather than reusing the
//! teacher's jittered `RetryManager` (see DESIGN.md).

use std::time::Duration;

/// `base * 2^(attempt - 1)`, capped at `max`. `attempt` is 1-based: the
/// delay before the first retry is `base`.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let multiplier = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let millis = (base.as_millis() as u64).saturating_mul(multiplier);
    Duration::from_millis(millis).min(max)
}
