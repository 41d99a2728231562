//! The `example` JSON-RPC namespace.
//!
//! - `example_latestHeader()`: last header seen by the driver
//! - `example_sendTx(candidate)`: submit a transaction and wait for its receipt

use std::sync::Arc;

use crate::blockchain::{Header, TxCandidate, TxReceipt};
use crate::driver::PollingDriver;
use crate::observability::metrics::{Metrics, RequestTimer};
use crate::rpc::{Params, RpcError, RpcModule};

pub const NAMESPACE: &str = "example";

/// Handlers backing the `example` namespace.
#[derive(Debug, Clone)]
pub struct Api {
    driver: Arc<PollingDriver>,
    metrics: Option<Arc<Metrics>>,
}

impl Api {
    pub fn new(driver: Arc<PollingDriver>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { driver, metrics }
    }

    pub fn latest_header(&self) -> Result<Header, RpcError> {
        let _timer = self.record("example_latestHeader");
        tracing::info!("example_latestHeader");
        self.driver
            .latest_header()
            .map(|header| header.as_ref().clone())
            .ok_or_else(|| RpcError::Server("no header observed yet".to_string()))
    }

    pub async fn send_tx(&self, candidate: TxCandidate) -> Result<TxReceipt, RpcError> {
        let _timer = self.record("example_sendTx");
        tracing::info!(?candidate, "example_sendTx");
        self.driver
            .submit(candidate)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }

    fn record(&self, method: &str) -> Option<RequestTimer> {
        self.metrics
            .as_ref()
            .map(|metrics| metrics.record_rpc_server_request(method))
    }

    /// Wrap the handlers as a method group.
    pub fn into_module(self) -> RpcModule {
        let api = Arc::new(self);
        let latest = api.clone();
        RpcModule::new(NAMESPACE)
            .register("latestHeader", move |_params: Params| {
                let api = latest.clone();
                async move { api.latest_header() }
            })
            .register("sendTx", move |params: Params| {
                let api = api.clone();
                async move {
                    let candidate: TxCandidate = params.one()?;
                    api.send_tx(candidate).await
                }
            })
    }
}
