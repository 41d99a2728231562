//! Upstream RPC client with timeout and failover.
//!
//! # Responsibilities
//! - Connect to the primary JSON-RPC endpoint plus any failovers
//! - Query chain state (latest header, chain id)
//! - Bound every call with the configured timeout
//! - Serve as the driver's [`HeaderSource`]

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainId, Header};
use crate::config::UpstreamConfig;

/// Anything that can report the latest header of a chain.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    async fn latest_header(&self) -> BlockchainResult<Header>;
}

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    /// Primary endpoint, kept for diagnostics.
    rpc_url: String,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new client. No request is made; an unreachable node shows up
    /// as poll failures, not as a construction error.
    pub fn new(config: &UpstreamConfig) -> BlockchainResult<Self> {
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(
            Arc::new(ProviderBuilder::new().connect_http(primary_url))
                as Arc<dyn Provider + Send + Sync>,
        );

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(
                    Arc::new(ProviderBuilder::new().connect_http(url))
                        as Arc<dyn Provider + Send + Sync>,
                );
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        tracing::info!(
            rpc_url = %config.rpc_url,
            failovers = providers.len() - 1,
            "Upstream client initialized"
        );

        Ok(Self {
            providers,
            rpc_url: config.rpc_url.clone(),
            timeout_duration: config.timeout(),
        })
    }

    /// Verify the connected chain ID matches the expected one.
    pub async fn verify_chain_id(&self, expected: u64) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != expected {
            return Err(BlockchainError::ChainMismatch {
                expected,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_chain_id();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(ChainId(result)),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(BlockchainError::Rpc("All RPC providers failed".to_string()))
    }

    /// Get the header of the latest block.
    pub async fn get_latest_header(&self) -> BlockchainResult<Header> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_block_by_number(BlockNumberOrTag::Latest);
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(Some(block))) => return Ok(Header::from(&block.header)),
                Ok(Ok(None)) => {
                    return Err(BlockchainError::BlockNotFound("latest".to_string()));
                }
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(BlockchainError::Rpc(
            "All providers failed to get latest header".to_string(),
        ))
    }
}

#[async_trait]
impl HeaderSource for BlockchainClient {
    async fn latest_header(&self) -> BlockchainResult<Header> {
        self.get_latest_header().await
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.rpc_url)
            .field("providers", &self.providers.len())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            failover_urls: Vec::new(),
            timeout_secs: 1,
            poll_interval_ms: 1000,
        }
    }

    #[test]
    fn test_client_creation() {
        // Nothing listens on port 1, but construction does no I/O.
        assert!(BlockchainClient::new(&test_config()).is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        let err = BlockchainClient::new(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[tokio::test]
    async fn test_rpc_failover() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        config.failover_urls.push("::garbage::".to_string());

        let client = BlockchainClient::new(&config).unwrap();
        assert_eq!(client.providers.len(), 2);

        let result = client.latest_header().await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("All providers failed"));
    }
}
