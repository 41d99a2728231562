//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamConfig
//!     → client.rs (HeaderSource: latest header, with failover + timeouts)
//!
//! Environment Variables (private key)
//!     → wallet.rs (key loading, signer)
//!     → txmgr.rs (TxSubmitter: price, sign, broadcast, confirm)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod txmgr;
pub mod types;
pub mod wallet;

pub use client::{BlockchainClient, HeaderSource};
pub use txmgr::{TxManager, TxSubmitter};
pub use types::{BlockchainError, BlockchainResult, ChainId, Header, TxCandidate, TxReceipt};
pub use wallet::Wallet;
