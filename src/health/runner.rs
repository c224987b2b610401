//! Per-check execution loop.
//!
//! A runner invokes its probe, stores the result, waits according to the
//! delay policy, and repeats until shutdown. The n-th consecutive failure
//! waits step n-1 of the check's backoff sequence; any completed probe resets
//! the count, so the next wait is the first step again.

use crate::health::{
    CheckResult, DelayPolicy, Outcome, ProbeContext, ProbeError, Registration, ResultStore,
    DEFAULT_INTERVAL, DEFAULT_TIMEOUT,
};
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

/// Drives one registration until shutdown.
pub struct CheckRunner {
    registration: Registration,
    policy: DelayPolicy,
    store: Arc<ResultStore>,
    metrics: Option<MetricsCollector>,
    /// Consecutive failures; only this runner reads or writes it.
    attempt: u32,
}

impl CheckRunner {
    pub fn new(registration: Registration, policy: DelayPolicy, store: Arc<ResultStore>) -> Self {
        Self {
            registration,
            policy,
            store,
            metrics: None,
            attempt: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current consecutive failure count.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Run until `shutdown` is triggered.
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        let span = info_span!("check", check = %self.registration.name());

        async move {
            debug!("check runner starting");

            while !shutdown.is_shutdown() {
                let Some(delay) = self.run_once(&shutdown).await else {
                    break;
                };

                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            debug!("check runner stopped");
        }
        .instrument(span)
        .await
    }

    /// Execute the probe once and store the result.
    ///
    /// Returns the delay before the next execution, or `None` when shutdown
    /// interrupted the execution. Nothing is stored in that case, including
    /// failures that complete after shutdown was requested.
    pub async fn run_once(&mut self, shutdown: &ShutdownSignal) -> Option<Duration> {
        let name = self.registration.name().to_string();
        let timeout = self.policy.get_timeout(&name).unwrap_or_else(|e| {
            warn!(error = %e, "invalid timeout setting, using default");
            DEFAULT_TIMEOUT
        });

        // Cancelled by shutdown or, below, when the timeout expires
        let token = shutdown.child_token();
        let ctx = ProbeContext::new(Arc::clone(self.registration.metadata()), token.clone());
        let probe = Arc::clone(self.registration.probe());

        let start = Instant::now();
        let execution = tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            result = tokio::time::timeout(
                timeout,
                AssertUnwindSafe(probe.check(&ctx)).catch_unwind(),
            ) => Some(result),
        };
        let elapsed = start.elapsed();
        token.cancel();

        let result = match execution? {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ProbeError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(ProbeError::TimedOut(timeout)),
        };

        match result {
            Ok(outcome) => Some(self.on_success(&name, outcome, elapsed)),
            Err(_) if shutdown.is_shutdown() => None,
            Err(e) => Some(self.on_failure(&name, e, elapsed)),
        }
    }

    fn on_success(&mut self, name: &str, outcome: Outcome, elapsed: Duration) -> Duration {
        debug!(status = %outcome.status, elapsed = ?elapsed, "health check completed");

        if let Some(metrics) = &self.metrics {
            metrics.record_success(name, outcome.status, elapsed);
        }
        self.store.set(name, CheckResult::new(outcome, elapsed));
        self.attempt = 0;
        self.next_delay(name)
    }

    fn on_failure(&mut self, name: &str, error: ProbeError, elapsed: Duration) -> Duration {
        // The first failure of a run waits the first step of the sequence
        let delay = self.next_delay(name);
        self.attempt = self.attempt.saturating_add(1);

        let outcome = Outcome::unhealthy(error.to_string()).with_error(format!("{:?}", error));
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(name, elapsed, self.attempt);
        }
        self.store.set(name, CheckResult::new(outcome, elapsed));

        warn!(
            error = %error,
            attempt = self.attempt,
            retry_in = ?delay,
            "health check failed"
        );
        delay
    }

    /// Delay for the current number of consecutive failures before this one.
    fn next_delay(&self, name: &str) -> Duration {
        self.policy
            .get_delay(name, self.attempt)
            .unwrap_or_else(|e| {
                warn!(error = %e, "invalid delay setting, using default");
                DEFAULT_INTERVAL
            })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
