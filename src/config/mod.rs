//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            flags / CHAINWATCH_* env
//!     → loader.rs (parse)           → ConfigOverrides
//!               └──────── merge ────────┘
//!     → validation.rs (semantic checks, all errors at once)
//!     → ServiceConfig (validated, immutable)
//!     → handed to each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets (the signing key) never live in the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, unknown_env_vars, ConfigError, ConfigOverrides};
pub use schema::{
    LogConfig, LogFormat, MetricsConfig, PprofConfig, ProfileType, RpcConfig, ServiceConfig,
    TxMgrConfig, UpstreamConfig,
};
pub use validation::ValidationError;
