//! Seams between the orchestrator and its collaborators.

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::error::BoxError;

/// A background unit started after every endpoint is up and stopped before
/// any of them goes down.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Launch the background work and return without waiting on it.
    async fn start(&self, ctx: &CancellationToken) -> Result<(), BoxError>;

    /// Stop the background work and wait for it to exit. A cancelled `ctx`
    /// asks for an immediate, non-graceful exit.
    async fn stop(&self, ctx: &CancellationToken) -> Result<(), BoxError>;
}

/// What the orchestrator needs from a metrics sink.
pub trait Metricer: Send + Sync {
    /// Handle rendering the registry for the metrics endpoint.
    fn handle(&self) -> PrometheusHandle;

    fn record_info(&self, version: &str);

    fn record_up(&self);

    /// Drain pending samples so memory stays bounded between scrapes.
    fn run_upkeep(&self);
}
