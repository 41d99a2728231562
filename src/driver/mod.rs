//! Background driver.
//!
//! # Data Flow
//! ```text
//! interval tick → HeaderSource::latest_header → latest header (atomic swap)
//!                                             → metrics refs gauges
//! API latestHeader ← latest header
//! API sendTx       → TxSubmitter::send
//! ```

pub mod poller;

pub use poller::PollingDriver;
