//! Metrics collector using prometheus-client.
//!
//! Tracks execution counts, durations, current status, and consecutive
//! failures per check.

use crate::health::HealthStatus;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels identifying a check.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    pub check: String,
}

/// Labels for execution counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExecutionLabels {
    pub check: String,
    pub result: ExecutionResult,
}

/// Result of a check execution.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ExecutionResult {
    Healthy,
    Degraded,
    Unhealthy,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    checks_total: Family<ExecutionLabels, Counter>,
    check_duration_seconds: Family<CheckLabels, Histogram>,
    /// 0 = healthy, 1 = degraded, 2 = unhealthy.
    check_status: Family<CheckLabels, Gauge>,
    consecutive_failures: Family<CheckLabels, Gauge>,
    registry: Registry,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let checks_total = Family::<ExecutionLabels, Counter>::default();
        let check_duration_seconds =
            Family::<CheckLabels, Histogram>::new_with_constructor(|| {
                // 1ms up to ~60s
                Histogram::new(exponential_buckets(0.001, 3.0, 11))
            });
        let check_status = Family::<CheckLabels, Gauge>::default();
        let consecutive_failures = Family::<CheckLabels, Gauge>::default();

        registry.register(
            "pulsecheck_checks",
            "Total number of check executions",
            checks_total.clone(),
        );
        registry.register(
            "pulsecheck_check_duration_seconds",
            "Check execution duration in seconds",
            check_duration_seconds.clone(),
        );
        registry.register(
            "pulsecheck_check_status",
            "Latest check status (0=healthy, 1=degraded, 2=unhealthy)",
            check_status.clone(),
        );
        registry.register(
            "pulsecheck_consecutive_failures",
            "Consecutive failed executions per check",
            consecutive_failures.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                checks_total,
                check_duration_seconds,
                check_status,
                consecutive_failures,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a probe that returned an outcome.
    pub fn record_success(&self, check: &str, status: HealthStatus, duration: Duration) {
        let result = match status {
            HealthStatus::Healthy => ExecutionResult::Healthy,
            HealthStatus::Degraded => ExecutionResult::Degraded,
            HealthStatus::Unhealthy => ExecutionResult::Unhealthy,
        };
        self.record(check, result, status, duration, 0);
    }

    /// Record a probe that failed, timed out, or panicked.
    pub fn record_failure(&self, check: &str, duration: Duration, consecutive_failures: u32) {
        self.record(
            check,
            ExecutionResult::Failure,
            HealthStatus::Unhealthy,
            duration,
            consecutive_failures,
        );
    }

    fn record(
        &self,
        check: &str,
        result: ExecutionResult,
        status: HealthStatus,
        duration: Duration,
        consecutive_failures: u32,
    ) {
        let labels = CheckLabels {
            check: check.to_string(),
        };
        self.inner
            .checks_total
            .get_or_create(&ExecutionLabels {
                check: check.to_string(),
                result,
            })
            .inc();
        self.inner
            .check_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
        self.inner
            .check_status
            .get_or_create(&labels)
            .set(status.severity());
        self.inner
            .consecutive_failures
            .get_or_create(&labels)
            .set(consecutive_failures as i64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
