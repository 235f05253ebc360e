//! Bounded retries for broker sends.
//!
//! A lost republish or dead-letter send would strand the task, so those
//! sends get a few quick local attempts before the worker gives up and
//! lets the message be redelivered.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times, and how quickly, to repeat a failed send.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first extra attempt; doubled for each one after
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Label used in log lines
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self { max_retries, ..self }
    }

    pub fn with_base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    /// Sleep before extra attempt `n` (1-based).
    fn pause_before(&self, n: u32) -> Duration {
        let doubled = 1u32.checked_shl(n).map_or(self.max_delay, |f| self.base_delay.saturating_mul(f));
        doubled.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the retry budget is spent.
///
/// The error of the final attempt is returned.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if retries == config.max_retries {
            warn!(
                "{} gave up after {} attempts: {}",
                config.operation_name,
                retries + 1,
                err
            );
            return Err(err);
        }

        retries += 1;
        let pause = config.pause_before(retries);
        debug!(
            "{} failed ({}), attempt {} in {:?}",
            config.operation_name,
            err,
            retries + 1,
            pause
        );
        tokio::time::sleep(pause).await;
    }
}

/// Rate-limits error logging for a loop that may fail repeatedly.
///
/// The first `log_limit` consecutive failures are logged; after that a
/// single notice is emitted and the rest are silent until a success.
#[derive(Debug, Default)]
pub struct FailureTracker {
    streak: u32,
    log_limit: u32,
    muted: bool,
}

impl FailureTracker {
    pub fn new(log_limit: u32) -> Self {
        Self {
            log_limit,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        if self.muted {
            debug!("Recovered after {} consecutive failures", self.streak);
        }
        *self = Self::new(self.log_limit);
    }

    /// Count a failure. Returns whether it should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak <= self.log_limit {
            return true;
        }
        if !self.muted {
            self.muted = true;
            warn!(
                "{} consecutive failures, muting further error logs",
                self.log_limit
            );
        }
        false
    }

    pub fn failure_count(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig::new("publish").with_base_delay(Duration::from_secs(1));
        assert_eq!(config.pause_before(1), Duration::from_secs(2));
        assert_eq!(config.pause_before(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let config = RetryConfig::new("publish").with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("broker unavailable")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let config = RetryConfig::new("publish")
            .with_base_delay(Duration::from_millis(1))
            .with_max_retries(2);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_async(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {n}")) }
        })
        .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(2);
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}
