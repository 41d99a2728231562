//! chainwatch
//!
//! Polls an upstream chain node, serves the latest header over JSON-RPC and
//! submits transactions on request.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                 ServiceLifecycle                 │
//!                     │                                                  │
//!   GET /metrics ─────┼─▶ metrics endpoint ◀──── owned Prometheus registry│
//!   GET /debug/pprof ─┼─▶ profiling endpoint                             │
//!   POST / (JSON-RPC) ┼─▶ RPC endpoint ──▶ example_* / txmgr_* / admin_*  │
//!                     │                      │              │            │
//!                     │                      ▼              ▼            │
//!                     │               PollingDriver ──▶ TxManager ───────┼──▶ node
//!                     │                 (interval)                       │
//!                     │                      └──── BlockchainClient ─────┼──▶ node
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;

use chainwatch::api::Api;
use chainwatch::blockchain::wallet::PRIVATE_KEY_ENV_VAR;
use chainwatch::blockchain::{BlockchainClient, TxManager, Wallet};
use chainwatch::config::{resolve_config, unknown_env_vars, ConfigOverrides};
use chainwatch::lifecycle::signals::{force_on_next_signal, shutdown_signal};
use chainwatch::observability::{logging, Metrics};
use chainwatch::{PollingDriver, ServiceComponents, ServiceLifecycle, VERSION};

/// Command-line interface. Every flag can also be set through the
/// environment variable named next to it.
#[derive(Debug, Parser)]
#[command(name = "chainwatch", version, about = "Chain-polling JSON-RPC service")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "CHAINWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream node JSON-RPC URL.
    #[arg(long, env = "CHAINWATCH_RPC_URL")]
    rpc_url: Option<String>,

    /// Poll interval in milliseconds.
    #[arg(long, env = "CHAINWATCH_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Log level or filter directive.
    #[arg(long, env = "CHAINWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "CHAINWATCH_METRICS_ENABLED")]
    metrics_enabled: Option<bool>,

    #[arg(long, env = "CHAINWATCH_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[arg(long, env = "CHAINWATCH_PPROF_ENABLED")]
    pprof_enabled: Option<bool>,

    #[arg(long, env = "CHAINWATCH_PPROF_PORT")]
    pprof_port: Option<u16>,

    #[arg(long, env = "CHAINWATCH_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Serve the admin namespace.
    #[arg(long, env = "CHAINWATCH_RPC_ENABLE_ADMIN")]
    rpc_enable_admin: Option<bool>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            rpc_url: self.rpc_url.clone(),
            poll_interval_ms: self.poll_interval_ms,
            log_level: self.log_level.clone(),
            metrics_enabled: self.metrics_enabled,
            metrics_port: self.metrics_port,
            pprof_enabled: self.pprof_enabled,
            pprof_port: self.pprof_port,
            rpc_port: self.rpc_port,
            enable_admin: self.rpc_enable_admin,
        }
    }

    /// Every environment variable the process reads.
    fn known_env_vars() -> Vec<String> {
        let mut known: Vec<String> = Self::command()
            .get_arguments()
            .filter_map(|arg| arg.get_env())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        known.push(PRIVATE_KEY_ENV_VAR.to_string());
        known
    }
}

fn warn_unknown_env_vars() {
    let names = std::env::vars_os().map(|(name, _)| name.to_string_lossy().into_owned());
    for name in unknown_env_vars(names, &Cli::known_env_vars()) {
        tracing::warn!(name = %name, "Unknown environment variable");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), &cli.overrides())
        .map_err(|e| format!("invalid configuration: {}", e))?;

    logging::init(&config.log)?;
    tracing::info!(version = VERSION, "chainwatch starting");
    warn_unknown_env_vars();
    tracing::info!(
        rpc_url = %config.upstream.rpc_url,
        poll_interval_ms = config.upstream.poll_interval_ms,
        metrics_enabled = config.metrics.enabled,
        rpc_address = %config.rpc.bind_address(),
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new(""));

    let client = BlockchainClient::new(&config.upstream)?;
    client.verify_chain_id(config.txmgr.chain_id).await?;

    let wallet = Wallet::from_env(config.txmgr.chain_id)?;
    let txmgr = Arc::new(TxManager::new(
        &config.upstream,
        config.txmgr.clone(),
        &wallet,
        Some(metrics.clone()),
    )?);

    let driver = Arc::new(PollingDriver::new(
        config.upstream.poll_interval(),
        Arc::new(client),
        txmgr.clone(),
        Some(metrics.clone()),
    ));

    let components = ServiceComponents::new()
        .with_metrics_sink(metrics.clone())
        .with_driver(driver.clone())
        .with_rpc_methods(txmgr.api())
        .with_rpc_methods(txmgr.admin_api())
        .with_rpc_methods(Api::new(driver, Some(metrics)).into_module());

    let mut service = ServiceLifecycle::new(VERSION, config, components);

    if let Err(e) = service.start(&CancellationToken::new()).await {
        tracing::error!(error = %e, "Application failed");
        if let Err(stop_err) = service.kill().await {
            tracing::error!(error = %stop_err, "Failed to release partially started service");
        }
        return Err(e.into());
    }

    shutdown_signal().await;

    let ctx = force_on_next_signal();
    service.stop(&ctx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
