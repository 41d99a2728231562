//! JSON-RPC subsystem.
//!
//! # Data Flow
//! ```text
//! POST / (single or batch)
//!     → server.rs (parse envelope, look up `<namespace>_<method>`)
//!     → module.rs handler (async, returns serde-serializable result)
//!     → types.rs Response (result or error object)
//! ```
//!
//! # Design Decisions
//! - Method groups are registered before start and fixed afterwards
//! - The `admin` namespace is opt-in via `rpc.enable_admin`

pub mod module;
pub mod server;
pub mod types;

pub use module::{MethodResult, RpcModule, ADMIN_NAMESPACE};
pub use server::RpcServer;
pub use types::{Params, RpcError};
