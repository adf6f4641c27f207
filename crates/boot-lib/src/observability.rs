//! Observability infrastructure for container managers
//!
//! Provides:
//! - Prometheus metrics (operations, failures, pull latency, managed/running containers, events)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for image pulls (in seconds)
const PULL_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<LifecycleMetricsInner> = OnceLock::new();

struct LifecycleMetricsInner {
    operations: IntCounterVec,
    operation_failures: IntCounterVec,
    image_pull_seconds: Histogram,
    managed_containers: IntGauge,
    running_containers: IntGauge,
    events_received: IntCounter,
    events_dropped: IntCounter,
}

impl LifecycleMetricsInner {
    fn new() -> Self {
        Self {
            operations: register_int_counter_vec!(
                "dockerboot_operations_total",
                "Container operations attempted",
                &["container_type", "operation"]
            )
            .expect("Failed to register operations_total"),

            operation_failures: register_int_counter_vec!(
                "dockerboot_operation_failures_total",
                "Container operations that failed",
                &["container_type", "operation"]
            )
            .expect("Failed to register operation_failures_total"),

            image_pull_seconds: register_histogram!(
                "dockerboot_image_pull_seconds",
                "Time spent pulling missing images",
                PULL_BUCKETS.to_vec()
            )
            .expect("Failed to register image_pull_seconds"),

            managed_containers: register_int_gauge!(
                "dockerboot_managed_containers",
                "Number of enabled container definitions"
            )
            .expect("Failed to register managed_containers"),

            running_containers: register_int_gauge!(
                "dockerboot_running_containers",
                "Number of managers that believe their container is running"
            )
            .expect("Failed to register running_containers"),

            events_received: register_int_counter!(
                "dockerboot_events_received_total",
                "Container events delivered to managers"
            )
            .expect("Failed to register events_received_total"),

            events_dropped: register_int_counter!(
                "dockerboot_events_dropped_total",
                "Container events a lagging listener never saw"
            )
            .expect("Failed to register events_dropped_total"),
        }
    }
}

/// Lifecycle metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct LifecycleMetrics {
    _private: (),
}

impl Default for LifecycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(LifecycleMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &LifecycleMetricsInner {
        GLOBAL_METRICS.get_or_init(LifecycleMetricsInner::new)
    }

    pub fn inc_operation(&self, container_type: &str, operation: &str) {
        self.inner()
            .operations
            .with_label_values(&[container_type, operation])
            .inc();
    }

    pub fn inc_failure(&self, container_type: &str, operation: &str) {
        self.inner()
            .operation_failures
            .with_label_values(&[container_type, operation])
            .inc();
    }

    pub fn observe_image_pull(&self, duration_secs: f64) {
        self.inner().image_pull_seconds.observe(duration_secs);
    }

    pub fn set_managed_containers(&self, count: i64) {
        self.inner().managed_containers.set(count);
    }

    pub fn inc_running(&self) {
        self.inner().running_containers.inc();
    }

    pub fn dec_running(&self) {
        self.inner().running_containers.dec();
    }

    pub fn inc_events_received(&self) {
        self.inner().events_received.inc();
    }

    pub fn add_events_dropped(&self, count: u64) {
        self.inner().events_dropped.inc_by(count);
    }

    pub fn events_dropped(&self) -> u64 {
        self.inner().events_dropped.get()
    }
}

/// Structured logger for host-level events
///
/// One JSON line per daemon startup, shutdown and host phase.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, managed_containers: usize) {
        info!(
            event = "host_started",
            instance = %self.instance,
            version = %version,
            managed_containers = managed_containers,
            "dockerboot started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "host_shutdown",
            instance = %self.instance,
            reason = %reason,
            "dockerboot shutting down"
        );
    }

    /// Log the outcome of running one host phase over every manager
    pub fn log_host_phase(&self, phase: &str, succeeded: usize, failed: usize) {
        if failed == 0 {
            info!(
                event = "host_phase",
                instance = %self.instance,
                phase = %phase,
                succeeded = succeeded,
                failed = failed,
                "Host phase complete"
            );
        } else {
            warn!(
                event = "host_phase",
                instance = %self.instance,
                phase = %phase,
                succeeded = succeeded,
                failed = failed,
                "Host phase completed with failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_metrics_creation() {
        let metrics = LifecycleMetrics::new();

        metrics.inc_operation("redis", "create_and_start");
        metrics.inc_failure("redis", "stop");
        metrics.observe_image_pull(1.5);
        metrics.set_managed_containers(2);
        metrics.inc_events_received();
        metrics.add_events_dropped(1);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "dockerboot_operations_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.instance, "test-host");
    }
}
