//! Retry backoff arithmetic

use std::time::Duration;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped at
/// `max`. Attempt 0 means "before the first try" and gets no delay.
pub fn retry_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}
