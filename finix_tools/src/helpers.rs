use std::time::Duration;

/// Exponential backoff: `initial * 2^(attempt - 1)` for attempt numbers starting at 1.
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    initial.saturating_mul(1u32 << exp)
}
