//! Exponential backoff with jitter for provider retries.
//!
//! [`BackoffConfig`] controls how transient provider failures (429, 5xx,
//! connection errors) are retried with increasing delays. The execution
//! engine waits out the computed delay between sequential attempts;
//! retries never run in parallel.

use std::time::Duration;

/// Configuration for retry delays between provider attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay before the first retry. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied after each retry. Default: 2.0.
    /// Delay grows: initial, initial * multiplier, initial * multiplier^2, ...
    pub multiplier: f64,

    /// Ceiling on any single delay. Default: 30 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// HTTP status codes treated as transient. Default: `[429, 500, 502, 503, 504]`.
    pub retryable_statuses: Vec<u16>,

    /// Whether to honor `Retry-After` headers from the provider.
    /// Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy, to avoid synchronized retry storms on shared rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter; delay is exactly the calculated value.
    None,
    /// Random value in `[0, calculated_delay]`.
    Full,
    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// Defaults suitable for hosted completion APIs.
    pub fn standard() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Short delays for interactive use where a caller is waiting:
    /// 250ms initial, 1.5x multiplier, 5s ceiling.
    pub fn interactive() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            jitter: JitterStrategy::Full,
            ..Self::standard()
        }
    }

    /// Deterministic delays for tests: no jitter, millisecond scale.
    pub fn fast() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10),
            jitter: JitterStrategy::None,
            ..Self::standard()
        }
    }

    /// Calculate the delay for retry N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            jitter: JitterStrategy::None,
            ..BackoffConfig::standard()
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let config = no_jitter();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(5),
            ..no_jitter()
        };
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_in_range() {
        let config = BackoffConfig::standard();
        for _ in 0..100 {
            let d = config.delay_for_attempt(1);
            assert!(d <= Duration::from_secs(2), "delay {:?} > 2s", d);
        }
    }

    #[test]
    fn test_equal_jitter_lower_bound() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..BackoffConfig::standard()
        };
        for _ in 0..100 {
            let d = config.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(500), "delay {:?} < 500ms", d);
            assert!(d <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_standard_preset() {
        let config = BackoffConfig::standard();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert!(config.retryable_statuses.contains(&429));
        assert!(config.retryable_statuses.contains(&503));
        assert!(config.respect_retry_after);
    }
}
