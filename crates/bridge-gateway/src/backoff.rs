/// Computes the delay before the next reconnect attempt, capped at 60s.
pub fn reconnect_delay_ms(reconnect_interval_ms: u64, attempts: u32) -> u64 {
    const CAP_MS: u64 = 60_000;
    let exponent = attempts.saturating_sub(1).min(20);
    let scaled = reconnect_interval_ms.saturating_mul(1u64 << exponent);
    scaled.min(CAP_MS)
}

/// Returns `true` once `attempts` has reached a configured unlimited(=0)/limited cap.
pub fn reconnect_attempts_exhausted(max_attempts: u32, attempts: u32) -> bool {
    max_attempts > 0 && attempts >= max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_reconnect_delay_doubles_per_attempt() {
        assert_eq!(reconnect_delay_ms(1_000, 1), 1_000);
        assert_eq!(reconnect_delay_ms(1_000, 2), 2_000);
        assert_eq!(reconnect_delay_ms(1_000, 3), 4_000);
    }

    #[test]
    fn unit_reconnect_delay_caps_at_60_seconds() {
        assert_eq!(reconnect_delay_ms(1_000, 20), 60_000);
    }

    #[test]
    fn unit_reconnect_attempts_exhausted_unlimited_when_zero() {
        assert!(!reconnect_attempts_exhausted(0, 1_000));
    }

    #[test]
    fn unit_reconnect_attempts_exhausted_at_limit() {
        assert!(reconnect_attempts_exhausted(5, 5));
        assert!(!reconnect_attempts_exhausted(5, 4));
    }
}
