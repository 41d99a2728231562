//! chainwatch: a chain-polling JSON-RPC service.
//!
//! A single process that polls an upstream node for its latest header,
//! serves it over JSON-RPC, and submits transactions on request. The
//! [`lifecycle::ServiceLifecycle`] orchestrator owns every sub-service and
//! brings them up and down in a fixed order.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod driver;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rpc;

pub use config::ServiceConfig;
pub use driver::PollingDriver;
pub use lifecycle::{ServiceComponents, ServiceError, ServiceLifecycle};

/// Version reported in `/healthz` and the `info` metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
