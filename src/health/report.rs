//! Aggregated health reports.

use super::outcome::duration_millis;
use crate::health::{CheckMetadata, CheckResult, HealthStatus, Registration, ResultStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Filter over check metadata.
pub type CheckFilter<'a> = &'a dyn Fn(&CheckMetadata) -> bool;

/// Health of all included checks at the time of the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Worst status among the entries; healthy when there are none.
    pub status: HealthStatus,
    /// Sum of the entries' durations.
    #[serde(with = "duration_millis", rename = "total_duration_ms")]
    pub total_duration: Duration,
    pub entries: BTreeMap<String, CheckResult>,
}

impl Report {
    pub fn from_results(entries: BTreeMap<String, CheckResult>) -> Self {
        let status = entries
            .values()
            .map(CheckResult::status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        let total_duration = entries.values().map(|r| r.duration).sum();

        Self {
            status,
            total_duration,
            entries,
        }
    }
}

/// Answers health queries from the latest stored results.
///
/// Queries never run a probe; they only read what the runners last stored.
#[derive(Clone)]
pub struct HealthService {
    store: Arc<ResultStore>,
    checks: Arc<HashMap<String, Arc<CheckMetadata>>>,
}

impl HealthService {
    pub fn new(store: Arc<ResultStore>, registrations: &[Registration]) -> Self {
        let checks = registrations
            .iter()
            .map(|r| (r.name().to_string(), Arc::clone(r.metadata())))
            .collect();

        Self {
            store,
            checks: Arc::new(checks),
        }
    }

    /// Build a report from the current results.
    ///
    /// With a filter, only results of registrations matching it are included.
    pub fn check_health(&self, filter: Option<CheckFilter<'_>>) -> Report {
        let mut results = self.store.snapshot();

        if let Some(filter) = filter {
            results.retain(|name, _| self.checks.get(name).is_some_and(|m| filter(m.as_ref())));
        }

        Report::from_results(results)
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}
