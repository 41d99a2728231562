//! Optional pieces handed to the orchestrator at construction.

use std::sync::Arc;

use crate::lifecycle::driver::{Driver, Metricer};
use crate::rpc::RpcModule;

/// Everything the orchestrator may run besides the profiling endpoint.
///
/// Built once, then moved into
/// [`ServiceLifecycle::new`](crate::lifecycle::ServiceLifecycle::new); there
/// is no way to add a component after that.
#[derive(Default)]
pub struct ServiceComponents {
    pub driver: Option<Arc<dyn Driver>>,
    pub metrics: Option<Arc<dyn Metricer>>,
    pub rpc_groups: Vec<RpcModule>,
}

impl ServiceComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_metrics_sink(mut self, metrics: Arc<dyn Metricer>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add one method group. Groups are served in registration order.
    pub fn with_rpc_methods(mut self, group: RpcModule) -> Self {
        self.rpc_groups.push(group);
        self
    }
}

impl std::fmt::Debug for ServiceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceComponents")
            .field("driver", &self.driver.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("rpc_groups", &self.rpc_groups)
            .finish()
    }
}
