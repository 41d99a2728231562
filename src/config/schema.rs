//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Upstream chain node the driver polls.
    pub upstream: UpstreamConfig,

    /// Transaction submission settings.
    pub txmgr: TxMgrConfig,

    /// Log output settings.
    pub log: LogConfig,

    /// Metrics endpoint settings.
    pub metrics: MetricsConfig,

    /// Profiling endpoint settings.
    pub pprof: PprofConfig,

    /// JSON-RPC endpoint settings.
    pub rpc: RpcConfig,
}

/// Upstream node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// JSON-RPC endpoint URL of the node to poll. Required.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, tried in order.
    pub failover_urls: Vec<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// How often the driver polls for the latest header, in milliseconds.
    pub poll_interval_ms: u64,
}

impl UpstreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            failover_urls: Vec::new(),
            timeout_secs: 10,
            poll_interval_ms: 6_000,
        }
    }
}

/// Transaction manager configuration.
///
/// The signing key is deliberately absent: it is only ever read from the
/// environment (see [`crate::blockchain::wallet`]).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TxMgrConfig {
    /// Chain ID used for EIP-155 signing.
    pub chain_id: u64,

    /// Confirmations to wait for before a send returns its receipt.
    pub num_confirmations: u64,

    /// Upper bound on waiting for a receipt, in seconds.
    pub receipt_timeout_secs: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,
}

impl Default for TxMgrConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            num_confirmations: 1,
            receipt_timeout_secs: 120,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Emit ANSI colors (text format only).
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            color: false,
        }
    }
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve the Prometheus endpoint.
    pub enabled: bool,

    /// Listen address.
    pub listen_addr: String,

    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
}

impl MetricsConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0".to_string(),
            port: 7300,
        }
    }
}

/// Profiles that can be captured to disk.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Cpu,
}

/// Profiling endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PprofConfig {
    /// Serve the on-demand profiling endpoint.
    pub listen_enabled: bool,

    /// Listen address.
    pub listen_addr: String,

    /// Listen port.
    pub port: u16,

    /// Profile continuously from startup and write it out on shutdown.
    pub profile_type: Option<ProfileType>,

    /// Directory the shutdown profile is written to.
    pub profile_dir: Option<PathBuf>,

    /// File name of the shutdown profile.
    pub profile_filename: String,
}

impl PprofConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}

impl Default for PprofConfig {
    fn default() -> Self {
        Self {
            listen_enabled: false,
            listen_addr: "0.0.0.0".to_string(),
            port: 6060,
            profile_type: None,
            profile_dir: None,
            profile_filename: "cpu.svg".to_string(),
        }
    }
}

/// JSON-RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Listen address.
    pub listen_addr: String,

    /// Listen port.
    pub port: u16,

    /// Expose method groups in the `admin` namespace.
    pub enable_admin: bool,
}

impl RpcConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8545,
            enable_admin: false,
        }
    }
}
