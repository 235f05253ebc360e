//! Broker configuration.

use std::time::Duration;

/// Kafka connection and consumer-group settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,
    /// Consumer group shared by all workers
    pub group_id: String,
    /// Client id reported to the brokers
    pub client_id: String,
    /// How long the producer waits for a delivery acknowledgement
    pub message_timeout: Duration,
    /// Heartbeat lapse after which a member loses its partitions
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Producer-internal send retries
    pub producer_retries: u32,
    /// How long a revoke waits for in-flight messages to finish
    pub revoke_timeout: Duration,
    /// Longest gap between polls before the member is evicted
    pub max_poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "video-processors".to_string(),
            client_id: "anb-worker".to_string(),
            message_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(3),
            producer_retries: 5,
            revoke_timeout: Duration::from_secs(600),
            max_poll_interval: Duration::from_secs(900),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            client_id: std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.client_id),
            message_timeout: env_millis("KAFKA_MESSAGE_TIMEOUT_MS")
                .unwrap_or(defaults.message_timeout),
            session_timeout: env_millis("KAFKA_SESSION_TIMEOUT_MS")
                .unwrap_or(defaults.session_timeout),
            heartbeat_interval: env_millis("KAFKA_HEARTBEAT_INTERVAL_MS")
                .unwrap_or(defaults.heartbeat_interval),
            producer_retries: defaults.producer_retries,
            revoke_timeout: env_millis("KAFKA_REVOKE_TIMEOUT_MS").unwrap_or(defaults.revoke_timeout),
            max_poll_interval: env_millis("KAFKA_MAX_POLL_INTERVAL_MS")
                .unwrap_or(defaults.max_poll_interval),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.group_id, "video-processors");
        assert_eq!(config.session_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.producer_retries, 5);
        // A revoke blocks polling, so it must fit inside the poll interval.
        assert!(config.revoke_timeout < config.max_poll_interval);
    }
}
