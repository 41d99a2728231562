//! Transaction submission.
//!
//! # Responsibilities
//! - Turn a [`TxCandidate`] into a signed, priced transaction
//! - Refuse to send while gas is above the configured ceiling
//! - Wait for the configured confirmations and hand back the receipt
//! - Refuse all work once closed
//!
//! The driver treats this as an opaque capability through [`TxSubmitter`];
//! it adds no retry or queuing on top.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxKind};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::blockchain::types::{BlockchainError, BlockchainResult, TxCandidate, TxReceipt};
use crate::blockchain::wallet::Wallet;
use crate::config::{TxMgrConfig, UpstreamConfig};
use crate::observability::metrics::Metrics;
use crate::rpc::{Params, RpcError, RpcModule, ADMIN_NAMESPACE};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Capability to send a transaction and wait for its receipt.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn send(&self, candidate: TxCandidate) -> BlockchainResult<TxReceipt>;

    /// Stop accepting work. Idempotent.
    fn close(&self);
}

/// Signs and sends transactions through a wallet-filling provider.
pub struct TxManager {
    provider: Arc<dyn Provider + Send + Sync>,
    from: Address,
    config: TxMgrConfig,
    rpc_timeout: Duration,
    max_gas_price_gwei: AtomicU64,
    closed: AtomicBool,
    metrics: Option<Arc<Metrics>>,
}

impl TxManager {
    /// Create a manager sending through the upstream's primary endpoint.
    pub fn new(
        upstream: &UpstreamConfig,
        config: TxMgrConfig,
        wallet: &Wallet,
        metrics: Option<Arc<Metrics>>,
    ) -> BlockchainResult<Self> {
        let url: url::Url = upstream.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", upstream.rpc_url, e))
        })?;
        let provider = ProviderBuilder::new()
            .wallet(wallet.to_network_wallet())
            .connect_http(url);

        tracing::info!(
            from = %wallet.address(),
            chain_id = config.chain_id,
            confirmations = config.num_confirmations,
            "Transaction manager initialized"
        );

        Ok(Self {
            provider: Arc::new(provider),
            from: wallet.address(),
            max_gas_price_gwei: AtomicU64::new(config.max_gas_price_gwei),
            config,
            rpc_timeout: upstream.timeout(),
            closed: AtomicBool::new(false),
            metrics,
        })
    }

    pub fn max_gas_price_gwei(&self) -> u64 {
        self.max_gas_price_gwei.load(Ordering::Relaxed)
    }

    pub fn set_max_gas_price_gwei(&self, gwei: u64) {
        tracing::info!(max_gas_price_gwei = gwei, "Updated gas price ceiling");
        self.max_gas_price_gwei.store(gwei, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Read-only methods, `txmgr` namespace.
    pub fn api(self: &Arc<Self>) -> RpcModule {
        let txmgr = self.clone();
        RpcModule::new("txmgr").register("getMaxGasPriceGwei", move |_params: Params| {
            let txmgr = txmgr.clone();
            async move { Ok::<_, RpcError>(txmgr.max_gas_price_gwei()) }
        })
    }

    /// Mutating methods, `admin` namespace.
    pub fn admin_api(self: &Arc<Self>) -> RpcModule {
        let txmgr = self.clone();
        RpcModule::new(ADMIN_NAMESPACE).register("setMaxGasPriceGwei", move |params: Params| {
            let txmgr = txmgr.clone();
            async move {
                let gwei: u64 = params.one()?;
                txmgr.set_max_gas_price_gwei(gwei);
                Ok::<_, RpcError>(Value::Null)
            }
        })
    }

    async fn build(&self, candidate: TxCandidate) -> BlockchainResult<TransactionRequest> {
        let gas_price = timeout(self.rpc_timeout, self.provider.get_gas_price())
            .await
            .map_err(|_| BlockchainError::Timeout(self.rpc_timeout.as_secs()))?
            .map_err(|e| BlockchainError::Rpc(e.to_string()))?;

        let max_gwei = self.max_gas_price_gwei();
        let gas_price_gwei = gas_price / WEI_PER_GWEI;
        if gas_price_gwei > max_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei,
            });
        }

        // Apply multiplier for safety margin
        let adjusted_gas_price = (gas_price as f64 * self.config.gas_price_multiplier) as u128;

        let mut tx = TransactionRequest::default()
            .with_from(self.from)
            .with_value(candidate.value)
            .with_input(candidate.tx_data)
            .with_gas_price(adjusted_gas_price)
            .with_chain_id(self.config.chain_id);
        tx.to = Some(match candidate.to {
            Some(to) => TxKind::Call(to),
            None => TxKind::Create,
        });
        if candidate.gas_limit > 0 {
            tx = tx.with_gas_limit(candidate.gas_limit);
        }
        Ok(tx)
    }

    async fn send_and_confirm(&self, candidate: TxCandidate) -> BlockchainResult<TxReceipt> {
        let tx = self.build(candidate).await?;

        let pending = timeout(self.rpc_timeout, self.provider.send_transaction(tx))
            .await
            .map_err(|_| BlockchainError::Timeout(self.rpc_timeout.as_secs()))?
            .map_err(|e| BlockchainError::Rpc(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        tracing::info!(tx_hash = %tx_hash, "Transaction sent, waiting for receipt");

        let receipt_timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        let receipt = timeout(
            receipt_timeout,
            pending
                .with_required_confirmations(self.config.num_confirmations)
                .get_receipt(),
        )
        .await
        .map_err(|_| BlockchainError::ConfirmationTimeout(receipt_timeout.as_secs()))?
        .map_err(|e| BlockchainError::Rpc(e.to_string()))?;

        let receipt = TxReceipt::from(&receipt);
        tracing::info!(
            tx_hash = %tx_hash,
            block_number = ?receipt.block_number,
            success = receipt.status,
            "Transaction confirmed"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl TxSubmitter for TxManager {
    async fn send(&self, candidate: TxCandidate) -> BlockchainResult<TxReceipt> {
        if self.is_closed() {
            return Err(BlockchainError::Closed);
        }

        let started = Instant::now();
        let result = self.send_and_confirm(candidate).await;
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.record_tx_sent(started.elapsed()),
                Err(_) => metrics.record_tx_failed(),
            }
        }
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Transaction failed");
        }
        result
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("Transaction manager closed");
        }
    }
}

impl std::fmt::Debug for TxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager")
            .field("from", &self.from)
            .field("chain_id", &self.config.chain_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
