//! Delay policy between check executions.
//!
//! Each check either backs off along a configured sequence (indexed by the
//! number of consecutive failures, clamped to the last entry) or waits a fixed
//! interval regardless of failures.

use crate::config::{
    setting_key, ConfigError, ConfigProvider, INTERVAL_ARRAY_SECONDS, INTERVAL_SECONDS,
    TIMEOUT_SECONDS,
};
use std::sync::Arc;
use std::time::Duration;

/// Backoff used when a sequence is configured but empty.
pub const DEFAULT_BACKOFF_SECONDS: [u64; 6] = [2, 4, 10, 20, 30, 60];

/// Fixed delay used when nothing is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Probe timeout used when nothing is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved wait schedule for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelaySchedule {
    /// Wait `steps[attempt]`, reusing the last step once attempts run past the end.
    Backoff(Vec<Duration>),
    /// Wait the same duration after every execution.
    Fixed(Duration),
}

impl DelaySchedule {
    /// Resolve the schedule for `name`. A sequence takes precedence over a
    /// fixed interval.
    pub fn resolve(config: &dyn ConfigProvider, name: &str) -> Result<Self, ConfigError> {
        if let Some(seconds) = config.get_list(&setting_key(name, INTERVAL_ARRAY_SECONDS))? {
            let seconds = if seconds.is_empty() {
                DEFAULT_BACKOFF_SECONDS.to_vec()
            } else {
                seconds
            };
            return Ok(DelaySchedule::Backoff(
                seconds.into_iter().map(Duration::from_secs).collect(),
            ));
        }

        let fixed = config
            .get_integer(&setting_key(name, INTERVAL_SECONDS))?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INTERVAL);
        Ok(DelaySchedule::Fixed(fixed))
    }

    /// Wait before the next execution, given the consecutive failure count.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            DelaySchedule::Backoff(steps) => steps
                .get(attempt as usize)
                .or(steps.last())
                .copied()
                .unwrap_or(DEFAULT_INTERVAL),
            DelaySchedule::Fixed(delay) => *delay,
        }
    }
}

/// Looks up per-check delays and timeouts from a configuration provider.
#[derive(Clone)]
pub struct DelayPolicy {
    config: Arc<dyn ConfigProvider>,
}

impl DelayPolicy {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }

    /// How long `name` waits after an execution with `attempt` consecutive failures.
    pub fn get_delay(&self, name: &str, attempt: u32) -> Result<Duration, ConfigError> {
        Ok(DelaySchedule::resolve(self.config.as_ref(), name)?.delay_for(attempt))
    }

    /// Probe timeout for `name`. Zero is malformed.
    pub fn get_timeout(&self, name: &str) -> Result<Duration, ConfigError> {
        let key = setting_key(name, TIMEOUT_SECONDS);
        match self.config.get_integer(&key)? {
            Some(0) => Err(ConfigError::Malformed {
                key,
                reason: "timeout must be at least one second".to_string(),
            }),
            Some(seconds) => Ok(Duration::from_secs(seconds)),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    /// Read every setting for `name`, failing on the first malformed value.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        DelaySchedule::resolve(self.config.as_ref(), name)?;
        self.get_timeout(name)?;
        Ok(())
    }
}

impl std::fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayPolicy").finish_non_exhaustive()
    }
}
