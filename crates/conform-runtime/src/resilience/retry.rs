//! Exponential backoff policy for correction calls.

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

impl RetryConfig {
    /// Backoff for the retries that follow the first call of a round.
    ///
    /// Delays double from `base_delay` and are capped at `max_delay`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_tries.saturating_sub(1) as usize)
    }
}

#[cfg(test)]
mod tests {
    use backon::BackoffBuilder;
    use std::time::Duration;

    use crate::config::RetryConfig;

    #[test]
    fn test_default_schedule() {
        let delays: Vec<Duration> = RetryConfig::default().backoff().build().collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn test_delays_capped() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            max_tries: 5,
        };
        let delays: Vec<Duration> = config.backoff().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_single_try_never_retries() {
        let config = RetryConfig {
            max_tries: 1,
            ..Default::default()
        };
        assert_eq!(config.backoff().build().count(), 0);
    }
}
