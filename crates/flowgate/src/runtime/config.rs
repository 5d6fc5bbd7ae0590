//! Scheduler configuration.

use std::time::Duration;

/// Configuration for the due-date scheduler.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use flowgate::SchedulerConfig;
///
/// let config = SchedulerConfig {
///     poll_interval: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether the scheduler scans at all.
    ///
    /// Sampled at each tick boundary; disabling stops further passes but does
    /// not cancel a pass already in progress. Default: enabled.
    pub enabled: bool,

    /// How often to scan for instances whose due date has elapsed.
    ///
    /// Due-date precision is limited by this interval. Default: 30 seconds.
    pub poll_interval: Duration,

    /// Maximum number of due instances processed per pass.
    ///
    /// Instances beyond the limit stay due and are picked up by the next
    /// pass. Default: 100.
    pub batch_limit: u32,

    /// How far to push an instance's due date when its re-trigger fails or
    /// aborts.
    ///
    /// Without the deferral a permanently failing instance would be rescanned
    /// on every tick. Default: 5 minutes.
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            batch_limit: 100,
            retry_backoff: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SchedulerConfig::default();

        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.batch_limit, 100);
        assert_eq!(config.retry_backoff, Duration::from_secs(300));
    }
}
