use std::time::Duration;

use crate::config::Config;

/// Exponential reconnect delays with a cap and additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base: config.reconnect_base,
            cap: config.reconnect_cap,
            jitter: config.reconnect_jitter,
        }
    }

    /// `min(base * 2^attempt, cap) + jitter_unit * jitter`, with `jitter_unit`
    /// clamped to `[0, 1]`.
    pub fn delay(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let exponential = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);
        exponential + self.jitter.mul_f64(jitter_unit.clamp(0.0, 1.0))
    }

    /// Upper bound of any delay this policy produces.
    pub fn max_delay(&self) -> Duration {
        self.cap + self.jitter
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..6)
            .map(|attempt| policy.delay(attempt, 0.0).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 15_000, 15_000]);
    }

    #[test]
    fn test_jitter_is_added_on_top() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0, 1.0), Duration::from_millis(1_500));
        assert_eq!(policy.delay(0, 0.5), Duration::from_millis(1_250));
        assert_eq!(policy.delay(10, 1.0), policy.max_delay());
    }

    #[test]
    fn test_out_of_range_jitter_is_clamped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0, 7.0), Duration::from_millis(1_500));
        assert_eq!(policy.delay(0, -1.0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_huge_attempts_do_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(u32::MAX, 0.0), Duration::from_secs(15));
    }
}
