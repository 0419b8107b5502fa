//! Reconnect delay schedule.

use std::time::Duration;

/// Delay before reconnect attempt `attempt`: `min(base * 2^attempt, cap)`.
///
/// Attempts are numbered from 1; the counter is incremented before the
/// delay is computed, so the first reconnect already waits `2 * base`.
pub fn delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}
