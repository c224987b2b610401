//! Probe interface and check registrations.

use crate::health::Outcome;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Ways a probe execution can fail.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}", humantime::format_duration(*.0))]
    TimedOut(Duration),

    #[error("probe panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProbeError::Failed(message.into())
    }
}

/// Static description of a registered check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckMetadata {
    pub name: String,
    pub tags: Vec<String>,
}

impl CheckMetadata {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Context handed to a probe for one execution.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    metadata: Arc<CheckMetadata>,
    cancellation: CancellationToken,
}

impl ProbeContext {
    pub fn new(metadata: Arc<CheckMetadata>, cancellation: CancellationToken) -> Self {
        Self {
            metadata,
            cancellation,
        }
    }

    pub fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether this execution has timed out or the engine is shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once this execution has timed out or the engine is shutting down.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// User-supplied health check logic.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Run the check once.
    async fn check(&self, ctx: &ProbeContext) -> Result<Outcome, ProbeError>;
}

/// Probe built from an async closure.
pub struct FnProbe<F>(F);

/// Wrap an async closure as a probe.
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, ProbeError>> + Send,
{
    FnProbe(f)
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, ProbeError>> + Send,
{
    async fn check(&self, ctx: &ProbeContext) -> Result<Outcome, ProbeError> {
        (self.0)(ctx.clone()).await
    }
}

/// Probe running synchronous logic on the blocking thread pool.
///
/// A timed-out execution stops being awaited, but the closure itself runs to
/// completion on its thread.
pub struct BlockingProbe<F> {
    f: Arc<F>,
}

impl<F> BlockingProbe<F>
where
    F: Fn(&ProbeContext) -> Result<Outcome, ProbeError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> Probe for BlockingProbe<F>
where
    F: Fn(&ProbeContext) -> Result<Outcome, ProbeError> + Send + Sync + 'static,
{
    async fn check(&self, ctx: &ProbeContext) -> Result<Outcome, ProbeError> {
        let f = Arc::clone(&self.f);
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || f(&ctx))
            .await
            .map_err(|e| ProbeError::Panicked(e.to_string()))?
    }
}

/// A named check and the probe that implements it.
#[derive(Clone)]
pub struct Registration {
    metadata: Arc<CheckMetadata>,
    probe: Arc<dyn Probe>,
}

impl Registration {
    pub fn new(name: impl Into<String>, probe: impl Probe + 'static) -> Self {
        Self::from_arc(name, Arc::new(probe))
    }

    pub fn from_arc(name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self {
            metadata: Arc::new(CheckMetadata {
                name: name.into(),
                tags: Vec::new(),
            }),
            probe,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.metadata).tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &Arc<CheckMetadata> {
        &self.metadata
    }

    pub fn probe(&self) -> &Arc<dyn Probe> {
        &self.probe
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
