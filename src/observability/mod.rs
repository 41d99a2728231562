//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms in an owned registry)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → GET /metrics (Prometheus scrape)
//!     → GET /debug/pprof/profile (profiling.rs, CPU flamegraphs)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments on pre-registered handles)
//! - Profiling is off unless configured

pub mod logging;
pub mod metrics;
pub mod profiling;

pub use metrics::Metrics;
pub use profiling::{ProfilingError, ProfilingService};
