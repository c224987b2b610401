//! Shared application state.

use crate::config::{Config, SharedConfig};
use crate::health::HealthService;
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Shared state accessible from all tasks.
#[derive(Clone)]
pub struct AppState {
    /// Current configuration (can be swapped atomically for hot reload).
    config: SharedConfig,

    /// Query side of the running engine.
    health: HealthService,

    metrics: MetricsCollector,

    shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(config: SharedConfig, health: HealthService, metrics: MetricsCollector) -> Self {
        Self {
            config,
            health,
            metrics,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> arc_swap::Guard<std::sync::Arc<Config>> {
        self.config.load()
    }

    pub fn shared_config(&self) -> &SharedConfig {
        &self.config
    }

    /// Swap in a reloaded configuration.
    ///
    /// Delay and timeout settings take effect on each runner's next
    /// iteration. The set of registered checks is fixed at startup, so added
    /// or removed checks are only reported.
    pub fn apply_reload(&self, new_config: Config) {
        let before = check_names(&self.config.load());
        let after = check_names(&new_config);

        for added in after.difference(&before) {
            warn!(check = %added, "new check in reloaded configuration ignored until restart");
        }
        for removed in before.difference(&after) {
            warn!(check = %removed, "removed check keeps running until restart");
        }

        self.config.store(new_config);
        info!("configuration reloaded");
    }

    pub fn health(&self) -> &HealthService {
        &self.health
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Get the shutdown signal.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Trigger shutdown.
    pub fn trigger_shutdown(&self) {
        self.shutdown.shutdown();
    }
}

fn check_names(config: &Config) -> BTreeSet<String> {
    config.checks.iter().map(|c| c.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, ConfigProvider};
    use crate::health::ResultStore;
    use std::sync::Arc;

    fn config(interval: u64) -> Config {
        parse_config(&format!(
            r#"
checks:
  - name: db
    interval_seconds: {interval}
    probe:
      type: tcp
      address: "127.0.0.1:5432"
"#
        ))
        .unwrap()
    }

    fn state(config: Config) -> AppState {
        AppState::new(
            SharedConfig::new(config),
            HealthService::new(Arc::new(ResultStore::new()), &[]),
            MetricsCollector::new(),
        )
    }

    #[test]
    fn test_reload_is_visible_through_provider() {
        let state = state(config(30));
        let provider: Arc<dyn ConfigProvider> = Arc::new(state.shared_config().clone());
        assert_eq!(provider.get_integer("db/IntervalSeconds").unwrap(), Some(30));

        state.apply_reload(config(5));

        assert_eq!(provider.get_integer("db/IntervalSeconds").unwrap(), Some(5));
        assert_eq!(state.config().checks[0].interval_seconds, Some(5));
    }

    #[test]
    fn test_shutdown_shared_between_clones() {
        let state = state(config(30));
        let clone = state.clone();

        clone.trigger_shutdown();

        assert!(state.shutdown().is_shutdown());
    }
}
