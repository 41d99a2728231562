//! Shared fakes for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chainwatch::blockchain::{
    BlockchainError, BlockchainResult, Header, HeaderSource, TxCandidate, TxReceipt, TxSubmitter,
};
use chainwatch::config::ServiceConfig;

pub fn header(number: u64) -> Header {
    Header {
        number,
        timestamp: 1_700_000_000 + number,
        ..Default::default()
    }
}

/// Returns scripted results in order, then keeps repeating the last one.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<u64, String>>>,
    last: Mutex<Result<u64, String>>,
    fetches: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(script: Vec<Result<u64, &str>>) -> Arc<Self> {
        let script = script
            .into_iter()
            .map(|step| step.map_err(str::to_string))
            .collect();
        Arc::new(Self {
            script: Mutex::new(script),
            last: Mutex::new(Err("script exhausted".to_string())),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(vec![Err("connection refused")])
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HeaderSource for ScriptedSource {
    async fn latest_header(&self) -> BlockchainResult<Header> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = script.pop_front() {
                *last = step;
            }
            last.clone()
        };
        step.map(header).map_err(BlockchainError::Rpc)
    }
}

/// A source whose fetch never completes.
#[allow(dead_code)]
pub struct HangingSource;

#[async_trait]
impl HeaderSource for HangingSource {
    async fn latest_header(&self) -> BlockchainResult<Header> {
        std::future::pending().await
    }
}

/// Accepts every transaction until closed.
#[derive(Default)]
pub struct CountingSubmitter {
    sent: AtomicUsize,
    closed: AtomicBool,
}

#[allow(dead_code)]
impl CountingSubmitter {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSubmitter for CountingSubmitter {
    async fn send(&self, _candidate: TxCandidate) -> BlockchainResult<TxReceipt> {
        if self.is_closed() {
            return Err(BlockchainError::Closed);
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(TxReceipt {
            block_number: Some(1),
            gas_used: 21_000,
            status: true,
            ..Default::default()
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Config binding every endpoint to an ephemeral loopback port.
#[allow(dead_code)]
pub fn local_config(poll_interval: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.upstream.rpc_url = "http://127.0.0.1:8545".to_string();
    config.upstream.poll_interval_ms = poll_interval.as_millis() as u64;
    config.metrics.listen_addr = "127.0.0.1".to_string();
    config.metrics.port = 0;
    config.pprof.listen_addr = "127.0.0.1".to_string();
    config.pprof.port = 0;
    config.rpc.listen_addr = "127.0.0.1".to_string();
    config.rpc.port = 0;
    config
}
