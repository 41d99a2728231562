//! Background header polling.
//!
//! # Responsibilities
//! - Poll the upstream source once per interval on a single task
//! - Publish the last good header for lock-free reads
//! - Forward submissions to the transaction capability
//!
//! # Design Decisions
//! - The published header is swapped as a whole (`ArcSwapOption`), so a
//!   reader never observes a partially written value
//! - A failed poll is logged and counted; the published header stays as is
//! - The first poll happens one interval after start
//! - Missed ticks are skipped, never bunched up behind a slow fetch
//! - Cancellation is only observed between polls; an in-flight fetch runs
//!   to completion

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::{BlockchainResult, Header, HeaderSource, TxCandidate, TxReceipt, TxSubmitter};
use crate::lifecycle::{BoxError, Driver};
use crate::observability::metrics::Metrics;

/// Polls an upstream [`HeaderSource`] and owns the [`TxSubmitter`].
pub struct PollingDriver {
    interval: Duration,
    source: Arc<dyn HeaderSource>,
    submitter: Arc<dyn TxSubmitter>,
    metrics: Option<Arc<Metrics>>,

    latest: Arc<ArcSwapOption<Header>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PollingDriver {
    pub fn new(
        interval: Duration,
        source: Arc<dyn HeaderSource>,
        submitter: Arc<dyn TxSubmitter>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            interval,
            source,
            submitter,
            metrics,
            latest: Arc::new(ArcSwapOption::empty()),
            task: Mutex::new(None),
        }
    }

    /// Most recent successfully polled header, if any.
    pub fn latest_header(&self) -> Option<Arc<Header>> {
        self.latest.load_full()
    }

    /// Hand `candidate` to the submission capability as is.
    pub async fn submit(&self, candidate: TxCandidate) -> BlockchainResult<TxReceipt> {
        self.submitter.send(candidate).await
    }
}

#[async_trait]
impl Driver for PollingDriver {
    async fn start(&self, ctx: &CancellationToken) -> Result<(), BoxError> {
        if ctx.is_cancelled() {
            return Err("start context already cancelled".into());
        }

        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err("driver already started".into());
        }

        let shutdown = CancellationToken::new();
        let poll = PollLoop {
            interval: self.interval,
            source: self.source.clone(),
            latest: self.latest.clone(),
            metrics: self.metrics.clone(),
            shutdown: shutdown.clone(),
        };
        *task = Some((shutdown, tokio::spawn(poll.run())));

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Driver started");
        Ok(())
    }

    async fn stop(&self, ctx: &CancellationToken) -> Result<(), BoxError> {
        tracing::info!("Stopping driver");

        self.submitter.close();

        let running = self.task.lock().await.take();
        if let Some((shutdown, mut handle)) = running {
            shutdown.cancel();
            let joined = tokio::select! {
                biased;
                res = &mut handle => res,
                _ = ctx.cancelled() => {
                    tracing::warn!("Forcing driver loop closed");
                    handle.abort();
                    handle.await
                }
            };
            match joined {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("Driver stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PollingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingDriver")
            .field("interval", &self.interval)
            .field("latest", &self.latest_header().map(|h| h.number))
            .finish()
    }
}

/// State owned by the background task.
struct PollLoop {
    interval: Duration,
    source: Arc<dyn HeaderSource>,
    latest: Arc<ArcSwapOption<Header>>,
    metrics: Option<Arc<Metrics>>,
    shutdown: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Main loop returning");
                    return;
                }
            }
        }
    }

    async fn poll(&self) {
        tracing::debug!("Querying latest header");
        match self.source.latest_header().await {
            Ok(header) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_latest_header(&header);
                }
                self.latest.store(Some(Arc::new(header)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get latest header");
                if let Some(metrics) = &self.metrics {
                    metrics.record_poll_failure();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainError;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct CountingSource(AtomicU64);

    #[async_trait]
    impl HeaderSource for CountingSource {
        async fn latest_header(&self) -> BlockchainResult<Header> {
            let number = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Header {
                number,
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct ClosableSubmitter(AtomicBool);

    #[async_trait]
    impl TxSubmitter for ClosableSubmitter {
        async fn send(&self, _candidate: TxCandidate) -> BlockchainResult<TxReceipt> {
            if self.0.load(Ordering::SeqCst) {
                return Err(BlockchainError::Closed);
            }
            Ok(TxReceipt::default())
        }

        fn close(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn driver(metrics: Option<Arc<Metrics>>) -> (PollingDriver, Arc<ClosableSubmitter>) {
        let submitter = Arc::new(ClosableSubmitter::default());
        let driver = PollingDriver::new(
            Duration::from_millis(100),
            Arc::new(CountingSource(AtomicU64::new(0))),
            submitter.clone(),
            metrics,
        );
        (driver, submitter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_after_one_interval() {
        let (driver, _) = driver(None);
        driver.start(&CancellationToken::new()).await.unwrap();
        assert!(driver.latest_header().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(driver.latest_header().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(driver.latest_header().unwrap().number, 1);

        driver.stop(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_records_metrics() {
        let metrics = Arc::new(Metrics::new("poller"));
        let (driver, _) = driver(Some(metrics.clone()));
        driver.start(&CancellationToken::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        driver.stop(&CancellationToken::new()).await.unwrap();

        assert_eq!(driver.latest_header().unwrap().number, 2);
        assert!(metrics
            .render()
            .contains("chainwatch_poller_refs_number{layer=\"l1\",type=\"latest_block\"} 2"));
    }

    #[tokio::test]
    async fn test_submit_forwards_until_closed() {
        let (driver, submitter) = driver(None);
        assert!(driver.submit(TxCandidate::default()).await.is_ok());

        driver.stop(&CancellationToken::new()).await.unwrap();
        assert!(submitter.0.load(Ordering::SeqCst));
        assert!(matches!(
            driver.submit(TxCandidate::default()).await,
            Err(BlockchainError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_cancelled_ctx_and_double_start() {
        let (driver, _) = driver(None);
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(driver.start(&cancelled).await.is_err());

        let ctx = CancellationToken::new();
        driver.start(&ctx).await.unwrap();
        assert!(driver.start(&ctx).await.is_err());

        driver.stop(&ctx).await.unwrap();
        driver.stop(&ctx).await.unwrap();
    }
}
