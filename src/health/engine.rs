//! Health check engine.
//!
//! Owns the fixed set of registrations and runs one independent runner task
//! per registration until shutdown.

use crate::config::{ConfigError, ConfigProvider};
use crate::health::{CheckRunner, DelayPolicy, HealthService, Registration, ResultStore};
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Errors detected while setting up the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate check registration: {0}")]
    DuplicateRegistration(String),

    #[error("invalid configuration for check '{check}': {source}")]
    Config {
        check: String,
        #[source]
        source: ConfigError,
    },
}

/// Runs every registered check in the background.
pub struct Engine {
    registrations: Vec<Registration>,
    policy: DelayPolicy,
    store: Arc<ResultStore>,
    metrics: Option<MetricsCollector>,
}

impl Engine {
    /// Create an engine, rejecting duplicate names and unreadable settings.
    pub fn new(
        registrations: Vec<Registration>,
        config: Arc<dyn ConfigProvider>,
    ) -> Result<Self, EngineError> {
        let policy = DelayPolicy::new(config);
        let mut names = HashSet::new();

        for registration in &registrations {
            let name = registration.name();
            if !names.insert(name) {
                return Err(EngineError::DuplicateRegistration(name.to_string()));
            }
            policy.validate(name).map_err(|source| EngineError::Config {
                check: name.to_string(),
                source,
            })?;
        }

        Ok(Self {
            registrations,
            policy,
            store: Arc::new(ResultStore::new()),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Query interface over this engine's results.
    pub fn health_service(&self) -> HealthService {
        HealthService::new(Arc::clone(&self.store), &self.registrations)
    }

    /// Run all checks until `shutdown` is triggered.
    ///
    /// Returns immediately when nothing is registered. Otherwise returns once
    /// every runner has stopped. A runner task that dies is logged and does
    /// not affect the others.
    pub async fn start(self, shutdown: ShutdownSignal) {
        if self.registrations.is_empty() {
            info!("no health checks registered, engine idle");
            return;
        }

        info!(checks = self.registrations.len(), "health check engine starting");

        let handles: Vec<_> = self
            .registrations
            .into_iter()
            .map(|registration| {
                let name = registration.name().to_string();
                let mut runner =
                    CheckRunner::new(registration, self.policy.clone(), Arc::clone(&self.store));
                if let Some(metrics) = &self.metrics {
                    runner = runner.with_metrics(metrics.clone());
                }
                (name, tokio::spawn(runner.run(shutdown.clone())))
            })
            .collect();

        futures::future::join_all(handles.into_iter().map(|(name, handle)| async move {
            if let Err(e) = handle.await {
                error!(check = %name, error = %e, "check runner terminated unexpectedly");
            }
        }))
        .await;

        info!("health check engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::health::{probe_fn, HealthStatus, Outcome, ProbeContext};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn healthy(name: &str) -> Registration {
        Registration::new(name, probe_fn(|_ctx: ProbeContext| async { Ok(Outcome::healthy()) }))
    }

    fn config() -> Arc<dyn ConfigProvider> {
        Arc::new(MemoryConfig::new())
    }

    #[tokio::test]
    async fn test_empty_engine_returns_immediately() {
        let engine = Engine::new(vec![], config()).unwrap();
        // Never triggered
        let shutdown = ShutdownSignal::new();

        tokio::time::timeout(Duration::from_secs(1), engine.start(shutdown))
            .await
            .expect("empty engine should not wait for shutdown");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = Engine::new(vec![healthy("db"), healthy("db")], config());
        assert!(matches!(
            result,
            Err(EngineError::DuplicateRegistration(name)) if name == "db"
        ));
    }

    #[test]
    fn test_malformed_config_rejected() {
        let config = MemoryConfig::new().with("db/IntervalArraySeconds", "2,four");
        let result = Engine::new(vec![healthy("db")], Arc::new(config));
        assert!(matches!(
            result,
            Err(EngineError::Config { check, .. }) if check == "db"
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = MemoryConfig::new().with("db/TimeoutSeconds", "0");
        let result = Engine::new(vec![healthy("db")], Arc::new(config));
        assert!(matches!(
            result,
            Err(EngineError::Config { check, source: ConfigError::Malformed { .. } }) if check == "db"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_check_does_not_block_others() {
        let fast_runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fast_runs);
        let registrations = vec![
            Registration::new(
                "hung",
                probe_fn(|_ctx: ProbeContext| async {
                    std::future::pending::<()>().await;
                    Ok(Outcome::healthy())
                }),
            ),
            Registration::new(
                "fast",
                probe_fn(move |_ctx: ProbeContext| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Outcome::healthy())
                    }
                }),
            ),
        ];
        let config = MemoryConfig::new()
            .with("hung/TimeoutSeconds", "3600")
            .with("fast/IntervalSeconds", "1");
        let engine = Engine::new(registrations, Arc::new(config)).unwrap();
        let service = engine.health_service();
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(engine.start(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(5500)).await;

        // Runs at 0..=5 seconds
        assert_eq!(fast_runs.load(Ordering::SeqCst), 6);
        let report = service.check_health(None);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries["fast"].status(), HealthStatus::Healthy);

        shutdown.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_runners() {
        let runs = Arc::new(AtomicU32::new(0));
        let registrations = (0..4)
            .map(|i| {
                let runs = Arc::clone(&runs);
                Registration::new(
                    format!("check-{i}"),
                    probe_fn(move |_ctx: ProbeContext| {
                        let runs = Arc::clone(&runs);
                        async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            Err(crate::health::ProbeError::failed("down"))
                        }
                    }),
                )
            })
            .collect();
        let engine = Engine::new(registrations, config()).unwrap();
        let store = Arc::clone(engine.store());
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(engine.start(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(30), task)
            .await
            .expect("engine should stop within one timeout period")
            .unwrap();

        let runs_at_shutdown = runs.load(Ordering::SeqCst);
        let snapshot = store.snapshot();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(runs_at_shutdown, 4);
        assert_eq!(runs.load(Ordering::SeqCst), runs_at_shutdown);
        assert_eq!(store.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_panicking_probe_does_not_affect_others() {
        let registrations = vec![
            Registration::new(
                "broken",
                probe_fn(|_ctx: ProbeContext| async move {
                    if true {
                        panic!("probe bug");
                    }
                    Ok(Outcome::healthy())
                }),
            ),
            healthy("ok"),
        ];
        let engine = Engine::new(registrations, config()).unwrap();
        let service = engine.health_service();
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(engine.start(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = service.check_health(None);
        assert_eq!(report.entries["ok"].status(), HealthStatus::Healthy);
        assert_eq!(report.entries["broken"].status(), HealthStatus::Unhealthy);
        assert_eq!(report.status, HealthStatus::Unhealthy);

        shutdown.shutdown();
        task.await.unwrap();
    }
}
