//! Latest-result storage shared by all check runners.

use crate::health::CheckResult;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Latest result per check.
///
/// Each runner writes only its own key, so writers for different checks land
/// on independent shards and never serialize behind a global lock. A result is
/// replaced as a whole, so readers never see a partially written entry.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: DashMap<String, CheckResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored result for `name`.
    pub fn set(&self, name: &str, result: CheckResult) {
        self.results.insert(name.to_string(), result);
    }

    /// Get a copy of the stored result for `name`.
    pub fn get(&self, name: &str) -> Option<CheckResult> {
        self.results.get(name).map(|r| r.value().clone())
    }

    /// Copy all results, ordered by check name.
    pub fn snapshot(&self) -> BTreeMap<String, CheckResult> {
        self.results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
