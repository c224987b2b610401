//! Metrics collection and the status endpoint.

mod collector;
mod server;

pub use collector::{ExecutionResult, MetricsCollector};
pub use server::{BoundStatusServer, StatusServer};
