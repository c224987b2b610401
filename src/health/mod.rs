//! Health check execution, storage, and reporting.

mod delay;
mod engine;
mod outcome;
mod probe;
mod probes;
mod report;
mod runner;
mod store;

pub use delay::{DelayPolicy, DelaySchedule, DEFAULT_BACKOFF_SECONDS, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
pub use engine::{Engine, EngineError};
pub use outcome::{CheckResult, HealthStatus, Outcome};
pub use probe::{
    probe_fn, BlockingProbe, CheckMetadata, FnProbe, Probe, ProbeContext, ProbeError, Registration,
};
pub use probes::{probe_from_config, registrations_from_config, HttpProbe, TcpProbe};
pub use report::{CheckFilter, HealthService, Report};
pub use runner::CheckRunner;
pub use store::ResultStore;
