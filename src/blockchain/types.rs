//! Chain-facing types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of a block header as observed from the upstream node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<u64>,
}

impl From<&alloy::rpc::types::Header> for Header {
    fn from(header: &alloy::rpc::types::Header) -> Self {
        Self {
            number: header.inner.number,
            hash: header.hash,
            parent_hash: header.inner.parent_hash,
            timestamp: header.inner.timestamp,
            gas_limit: header.inner.gas_limit,
            gas_used: header.inner.gas_used,
            base_fee_per_gas: header.inner.base_fee_per_gas,
        }
    }
}

/// A transaction the caller wants sent. Nonce, gas price and signature are
/// filled in by the transaction manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCandidate {
    /// Destination; `None` deploys a contract.
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub tx_data: Bytes,
    #[serde(default)]
    pub value: U256,
    /// Explicit gas limit; 0 lets the node estimate.
    #[serde(default)]
    pub gas_limit: u64,
}

/// Outcome of a sent transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// false if the transaction was mined but reverted.
    pub status: bool,
}

impl From<&alloy::rpc::types::TransactionReceipt> for TxReceipt {
    fn from(receipt: &alloy::rpc::types::TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            status: receipt.status(),
        }
    }
}

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node has no block to report.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Transaction was not confirmed within expected time.
    #[error("Transaction not confirmed after {0} seconds")]
    ConfirmationTimeout(u64),

    /// Invalid private key format or derivation error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// The transaction manager has been closed.
    #[error("transaction manager is closed")]
    Closed,
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;
