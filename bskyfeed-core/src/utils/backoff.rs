use std::time::Duration;

/// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`,
/// never more than `max`.
pub fn calculate_reconnect_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}
