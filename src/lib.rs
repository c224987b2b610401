//! pulsecheck - background health checks with backoff
//!
//! This crate runs registered health probes on independent schedules and
//! answers health queries from their latest results:
//! - Per-check retry delays with a backoff sequence or a fixed interval
//! - Timeouts and panic isolation for every probe execution
//! - Aggregated reports with optional filtering by check metadata
//! - Hot configuration reload
//! - Prometheus metrics and a JSON status endpoint

pub mod config;
pub mod health;
pub mod metrics;
pub mod state;
pub mod util;

pub use config::Config;
pub use health::{Engine, HealthService, Report};
