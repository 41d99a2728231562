//! Configuration validation.
//!
//! Serde handles the syntactic side; this is the semantic pass. It reports
//! every problem it finds, not just the first, and is a pure function of the
//! config.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("upstream.rpc_url is required")]
    MissingUpstreamUrl,

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("upstream.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("{section} listen address '{address}' is not a valid socket address")]
    InvalidListenAddress {
        section: &'static str,
        address: String,
    },

    #[error("pprof.profile_dir is required when pprof.profile_type is set")]
    MissingProfileDir,

    #[error("txmgr.num_confirmations must be at least 1")]
    ZeroConfirmations,

    #[error("txmgr.gas_price_multiplier must be at least 1.0, got {0}")]
    GasMultiplierTooLow(f64),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let upstream = &config.upstream;
    if upstream.rpc_url.is_empty() {
        errors.push(ValidationError::MissingUpstreamUrl);
    } else {
        check_url(&upstream.rpc_url, &mut errors);
    }
    for url in &upstream.failover_urls {
        check_url(url, &mut errors);
    }
    if upstream.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if config.metrics.enabled {
        check_listen("metrics", config.metrics.bind_address(), &mut errors);
    }
    if config.pprof.listen_enabled {
        check_listen("pprof", config.pprof.bind_address(), &mut errors);
    }
    if config.pprof.profile_type.is_some() && config.pprof.profile_dir.is_none() {
        errors.push(ValidationError::MissingProfileDir);
    }
    check_listen("rpc", config.rpc.bind_address(), &mut errors);

    if config.txmgr.num_confirmations == 0 {
        errors.push(ValidationError::ZeroConfirmations);
    }
    if config.txmgr.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::GasMultiplierTooLow(
            config.txmgr.gas_price_multiplier,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(url: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = url.parse::<url::Url>() {
        errors.push(ValidationError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        });
    }
}

fn check_listen(section: &'static str, address: String, errors: &mut Vec<ValidationError>) {
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListenAddress { section, address });
    }
}
