//! Worker metrics.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric name constants for consistency.
pub mod names {
    /// Deliveries received, by topic.
    pub const TASKS_CONSUMED_TOTAL: &str = "tasks_consumed_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "tasks_completed_total";
    pub const TASKS_RETRIED_TOTAL: &str = "tasks_retried_total";
    pub const TASKS_DEAD_LETTERED_TOTAL: &str = "tasks_dead_lettered_total";
    /// Payloads that could not be decoded.
    pub const TASKS_MALFORMED_TOTAL: &str = "tasks_malformed_total";
    /// Orchestrator run time per task, in seconds.
    pub const TASK_DURATION_SECONDS: &str = "task_duration_seconds";
    /// Pipeline stage latency, labelled by stage.
    pub const PIPELINE_STAGE_SECONDS: &str = anb_media::pipeline::STAGE_LATENCY_METRIC;
}

pub fn record_consumed(topic: &str) {
    counter!(names::TASKS_CONSUMED_TOTAL, "topic" => topic.to_string()).increment(1);
}

pub fn record_completed(duration: Duration) {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, "outcome" => "success").record(duration.as_secs_f64());
}

pub fn record_failed(duration: Duration) {
    histogram!(names::TASK_DURATION_SECONDS, "outcome" => "failure").record(duration.as_secs_f64());
}

pub fn record_retried() {
    counter!(names::TASKS_RETRIED_TOTAL).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::TASKS_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn record_malformed() {
    counter!(names::TASKS_MALFORMED_TOTAL).increment(1);
}

/// Serve Prometheus metrics on `addr`.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::TASKS_CONSUMED_TOTAL.ends_with("_total"));
        assert_eq!(names::PIPELINE_STAGE_SECONDS, "pipeline_stage_seconds");
    }
}
