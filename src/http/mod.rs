//! HTTP plumbing shared by the metrics, profiling and JSON-RPC endpoints.
//!
//! # Data Flow
//! ```text
//! sub-service start()
//!     → server.rs binds the listener, spawns axum::serve
//!     → HttpServer handle kept by the owner
//! sub-service stop(ctx)
//!     → graceful drain, or abort when ctx is cancelled
//! ```

pub mod server;

pub use server::{HttpServer, HttpServerError};
