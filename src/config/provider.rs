//! Key-value configuration lookup.
//!
//! Per-check settings are addressed by `"<check>/<Setting>"` keys. A missing
//! key is an ordinary condition and yields `Ok(None)`; only a value that is
//! present but cannot be read is an error.

use crate::config::{Config, ConfigError};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Setting name for the backoff sequence.
pub const INTERVAL_ARRAY_SECONDS: &str = "IntervalArraySeconds";
/// Setting name for the fixed delay.
pub const INTERVAL_SECONDS: &str = "IntervalSeconds";
/// Setting name for the probe timeout.
pub const TIMEOUT_SECONDS: &str = "TimeoutSeconds";

/// Build the lookup key for a check setting.
pub fn setting_key(check: &str, setting: &str) -> String {
    format!("{}/{}", check, setting)
}

/// Read-only source of per-check settings.
pub trait ConfigProvider: Send + Sync {
    /// Look up an ordered list of non-negative integers.
    fn get_list(&self, key: &str) -> Result<Option<Vec<u64>>, ConfigError>;

    /// Look up a single non-negative integer.
    fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError>;
}

impl<T: ConfigProvider + ?Sized> ConfigProvider for Arc<T> {
    fn get_list(&self, key: &str) -> Result<Option<Vec<u64>>, ConfigError> {
        (**self).get_list(key)
    }

    fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        (**self).get_integer(key)
    }
}

/// In-memory provider backed by flat string values.
///
/// Lists may be written either as a comma-separated value under the key
/// itself (an empty string is an empty list) or as indexed entries
/// `"<key>/0"`, `"<key>/1"`, ... .
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    values: HashMap<String, String>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw value, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl FromIterator<(String, String)> for MemoryConfig {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl ConfigProvider for MemoryConfig {
    fn get_list(&self, key: &str) -> Result<Option<Vec<u64>>, ConfigError> {
        if let Some(raw) = self.values.get(key) {
            return raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse_integer(key, part))
                .collect::<Result<Vec<_>, _>>()
                .map(Some);
        }

        let mut list = Vec::new();
        while let Some(raw) = self.values.get(&format!("{}/{}", key, list.len())) {
            list.push(parse_integer(key, raw)?);
        }

        Ok(if list.is_empty() { None } else { Some(list) })
    }

    fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.values
            .get(key)
            .map(|raw| parse_integer(key, raw))
            .transpose()
    }
}

fn parse_integer(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::Malformed {
        key: key.to_string(),
        reason: format!("'{}' is not a non-negative integer: {}", raw, e),
    })
}

impl ConfigProvider for Config {
    fn get_list(&self, key: &str) -> Result<Option<Vec<u64>>, ConfigError> {
        Ok(match key.split_once('/') {
            Some((name, INTERVAL_ARRAY_SECONDS)) => self
                .check(name)
                .and_then(|c| c.interval_array_seconds.clone()),
            _ => None,
        })
    }

    fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        Ok(match key.split_once('/') {
            Some((name, INTERVAL_SECONDS)) => self.check(name).and_then(|c| c.interval_seconds),
            Some((name, TIMEOUT_SECONDS)) => self.check(name).and_then(|c| c.timeout_seconds),
            _ => None,
        })
    }
}

/// Configuration that can be swapped atomically while checks are running.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Get the current configuration.
    pub fn load(&self) -> arc_swap::Guard<Arc<Config>> {
        self.inner.load()
    }

    /// Swap in a new configuration (for hot reload).
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }
}

impl ConfigProvider for SharedConfig {
    fn get_list(&self, key: &str) -> Result<Option<Vec<u64>>, ConfigError> {
        self.inner.load().get_list(key)
    }

    fn get_integer(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.inner.load().get_integer(key)
    }
}
