//! Configuration loading from disk and command-line overrides.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix shared by every environment variable the service reads.
pub const ENV_PREFIX: &str = "CHAINWATCH_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values that take precedence over the config file.
///
/// Populated by the binary from flags and `CHAINWATCH_*` environment
/// variables; `None` leaves the file (or default) value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub log_level: Option<String>,
    pub metrics_enabled: Option<bool>,
    pub metrics_port: Option<u16>,
    pub pprof_enabled: Option<bool>,
    pub pprof_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub enable_admin: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(url) = &self.rpc_url {
            config.upstream.rpc_url = url.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.upstream.poll_interval_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(enabled) = self.metrics_enabled {
            config.metrics.enabled = enabled;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.port = port;
        }
        if let Some(enabled) = self.pprof_enabled {
            config.pprof.listen_enabled = enabled;
        }
        if let Some(port) = self.pprof_port {
            config.pprof.port = port;
        }
        if let Some(port) = self.rpc_port {
            config.rpc.port = port;
        }
        if let Some(enabled) = self.enable_admin {
            config.rpc.enable_admin = enabled;
        }
    }
}

/// Names carrying [`ENV_PREFIX`] that are not in `known`, sorted.
///
/// Only names are inspected; values never leave the environment.
pub fn unknown_env_vars<S: AsRef<str>>(
    names: impl IntoIterator<Item = String>,
    known: &[S],
) -> Vec<String> {
    let mut unknown: Vec<String> = names
        .into_iter()
        .filter(|name| name.starts_with(ENV_PREFIX))
        .filter(|name| !known.iter().any(|k| k.as_ref() == name))
        .collect();
    unknown.sort();
    unknown
}

/// Parse a configuration file without validating it.
pub fn read_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Resolve the effective configuration: file (if any), then overrides, then
/// validation of the result.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ServiceConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_file() {
        let file = write_config(
            r#"
            [upstream]
            rpc_url = "http://localhost:8545"
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.upstream.rpc_url, "http://localhost:8545");
    }

    #[test]
    fn test_load_invalid_file_reports_validation() {
        let file = write_config("[upstream]\npoll_interval_ms = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 2));
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = write_config(
            r#"
            [upstream]
            rpc_url = "http://file:8545"

            [rpc]
            port = 1000
            "#,
        );
        let overrides = ConfigOverrides {
            rpc_url: Some("http://flag:8545".to_string()),
            rpc_port: Some(2000),
            enable_admin: Some(true),
            ..Default::default()
        };

        let config = resolve_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.upstream.rpc_url, "http://flag:8545");
        assert_eq!(config.rpc.port, 2000);
        assert!(config.rpc.enable_admin);
    }

    #[test]
    fn test_unknown_env_vars() {
        let names = [
            "CHAINWATCH_RPC_URL",
            "CHAINWATCH_RPC_ULR",
            "CHAINWATCH_PRIVATE_KEY",
            "CHAINWATCH_METRICS",
            "RUST_LOG",
            "PATH",
        ]
        .map(String::from);
        let known = ["CHAINWATCH_RPC_URL", "CHAINWATCH_PRIVATE_KEY"];

        assert_eq!(
            unknown_env_vars(names, &known),
            vec!["CHAINWATCH_METRICS", "CHAINWATCH_RPC_ULR"]
        );
        assert!(unknown_env_vars(Vec::new(), &known).is_empty());
    }

    #[test]
    fn test_overrides_without_file() {
        let overrides = ConfigOverrides {
            rpc_url: Some("http://localhost:8545".to_string()),
            ..Default::default()
        };
        assert!(resolve_config(None, &overrides).is_ok());
        assert!(resolve_config(None, &ConfigOverrides::default()).is_err());
    }
}
