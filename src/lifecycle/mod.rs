//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Construction (components.rs):
//!     driver? + metrics sink? + RPC groups → ServiceComponents → ServiceLifecycle
//!
//! Startup (service.rs):
//!     metrics endpoint → profiling → RPC endpoint → driver → record info/up
//!
//! Shutdown (service.rs):
//!     driver → RPC endpoint → profiling → metrics endpoint → stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful stop; repeated signal → forced stop
//! ```
//!
//! # Design Decisions
//! - Start and stop are strictly sequential, never parallel
//! - Stop is terminal: a stopped service cannot be started again
//! - Sub-services see a `CancellationToken`; cancelled means "skip the drain"

pub mod components;
pub mod driver;
pub mod error;
pub mod service;
pub mod signals;

pub use components::ServiceComponents;
pub use driver::{Driver, Metricer};
pub use error::{BoxError, ServiceError, Stage, StopErrors};
pub use service::ServiceLifecycle;
