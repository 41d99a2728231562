//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own a Prometheus registry for the lifetime of the service
//! - Register fixed series once, at construction
//! - Expose the registry on a `/metrics` endpoint
//! - Drain histogram samples on a timer so an unscraped registry stays bounded
//!
//! # Metrics
//! - `<ns>_up` (gauge): 1 once startup has completed
//! - `<ns>_info{version}` (gauge): always 1, carries the version label
//! - `<ns>_refs_number{layer,type}` / `<ns>_refs_time{layer,type}` (gauge): latest polled header
//! - `<ns>_poll_failures_total` (counter): failed upstream polls
//! - `<ns>_rpc_server_requests_total{method}` (counter)
//! - `<ns>_rpc_server_request_duration_seconds{method}` (histogram)
//! - `<ns>_tx_sent_total` / `<ns>_tx_failed_total` (counter)
//! - `<ns>_tx_confirm_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - The recorder is never installed globally; every series is created
//!   against it through `metrics::with_local_recorder`
//! - Several registries can coexist in one process (tests rely on this)
//! - Histogram samples accumulate until drained, either by a scrape or by
//!   upkeep; the upkeep task runs whenever a sink is registered, whether or
//!   not the endpoint is served

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use metrics::{
    describe_counter, describe_gauge, describe_histogram, with_local_recorder, Counter, Gauge,
    Histogram,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::Header;
use crate::http::{HttpServer, HttpServerError};
use crate::lifecycle::Metricer;

/// Prefix of every series name.
pub const NAMESPACE: &str = "chainwatch";

/// How often pending histogram samples are drained.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Owned metrics registry and pre-registered series.
pub struct Metrics {
    ns: String,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,

    up: Gauge,
    latest_number: Gauge,
    latest_time: Gauge,
    poll_failures: Counter,
    tx_sent: Counter,
    tx_failed: Counter,
    tx_confirm_duration: Histogram,
}

impl Metrics {
    /// Build a registry whose series are prefixed `chainwatch_<proc_name>`.
    pub fn new(proc_name: &str) -> Self {
        let proc_name = if proc_name.is_empty() {
            "default"
        } else {
            proc_name
        };
        let ns = format!("{}_{}", NAMESPACE, proc_name);

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let name = |suffix: &str| format!("{}_{}", ns, suffix);
        let (up, latest_number, latest_time, poll_failures, tx_sent, tx_failed, tx_confirm_duration) =
            with_local_recorder(&recorder, || {
                describe_gauge!(name("up"), "1 if the service has finished starting up");
                describe_gauge!(name("info"), "Pseudo-metric tracking version info");
                describe_gauge!(name("refs_number"), "Block number of the latest polled header");
                describe_gauge!(name("refs_time"), "Timestamp of the latest polled header");
                describe_counter!(name("poll_failures_total"), "Failed upstream polls");
                describe_counter!(
                    name("rpc_server_requests_total"),
                    "JSON-RPC requests served, by method"
                );
                describe_histogram!(
                    name("rpc_server_request_duration_seconds"),
                    metrics::Unit::Seconds,
                    "JSON-RPC request latency, by method"
                );
                describe_counter!(name("tx_sent_total"), "Transactions sent and confirmed");
                describe_counter!(name("tx_failed_total"), "Transactions that failed to send");
                describe_histogram!(
                    name("tx_confirm_duration_seconds"),
                    metrics::Unit::Seconds,
                    "Time from submission to receipt"
                );

                (
                    metrics::gauge!(name("up")),
                    metrics::gauge!(name("refs_number"), "layer" => "l1", "type" => "latest_block"),
                    metrics::gauge!(name("refs_time"), "layer" => "l1", "type" => "latest_block"),
                    metrics::counter!(name("poll_failures_total")),
                    metrics::counter!(name("tx_sent_total")),
                    metrics::counter!(name("tx_failed_total")),
                    metrics::histogram!(name("tx_confirm_duration_seconds")),
                )
            });

        Self {
            ns,
            recorder,
            handle,
            up,
            latest_number,
            latest_time,
            poll_failures,
            tx_sent,
            tx_failed,
            tx_confirm_duration,
        }
    }

    pub fn record_latest_header(&self, header: &Header) {
        self.latest_number.set(header.number as f64);
        self.latest_time.set(header.timestamp as f64);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.increment(1);
    }

    /// Count a JSON-RPC request; its latency is recorded when the returned
    /// timer is dropped.
    pub fn record_rpc_server_request(&self, method: &str) -> RequestTimer {
        let labels = [("method", method.to_string())];
        let (counter, histogram) = with_local_recorder(&self.recorder, || {
            (
                metrics::counter!(format!("{}_rpc_server_requests_total", self.ns), &labels),
                metrics::histogram!(
                    format!("{}_rpc_server_request_duration_seconds", self.ns),
                    &labels
                ),
            )
        });
        counter.increment(1);
        RequestTimer {
            histogram,
            start: Instant::now(),
        }
    }

    pub fn record_tx_sent(&self, elapsed: Duration) {
        self.tx_sent.increment(1);
        self.tx_confirm_duration.record(elapsed.as_secs_f64());
    }

    pub fn record_tx_failed(&self) {
        self.tx_failed.increment(1);
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Metricer for Metrics {
    fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    fn record_info(&self, version: &str) {
        let labels = [("version", version.to_string())];
        with_local_recorder(&self.recorder, || {
            metrics::gauge!(format!("{}_info", self.ns), &labels)
        })
        .set(1.0);
    }

    fn record_up(&self) {
        self.up.set(1.0);
    }

    fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").field("ns", &self.ns).finish()
    }
}

/// Records elapsed time into a histogram on drop.
#[must_use = "the duration is recorded when the timer is dropped"]
pub struct RequestTimer {
    histogram: Histogram,
    start: Instant,
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.histogram.record(self.start.elapsed().as_secs_f64());
    }
}

/// Background task that periodically runs upkeep on a metrics sink.
#[derive(Debug)]
pub struct UpkeepTask {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UpkeepTask {
    /// Run `sink.run_upkeep()` every `period`, starting one period from now.
    pub fn spawn(sink: Arc<dyn Metricer>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => sink.run_upkeep(),
                }
            }
            tracing::debug!("Metrics upkeep stopped");
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Stop the timer and wait for the task; aborts it if `ctx` is cancelled.
    /// Calling `stop` again is a no-op.
    pub async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), JoinError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        self.shutdown.cancel();

        let result = tokio::select! {
            biased;
            res = &mut task => res,
            _ = ctx.cancelled() => {
                task.abort();
                task.await
            }
        };

        match result {
            Err(e) if !e.is_cancelled() => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for UpkeepTask {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Serve `handle` at `GET /metrics` on `bind`.
pub async fn start_server(
    handle: PrometheusHandle,
    bind: &str,
) -> Result<HttpServer, HttpServerError> {
    let router = Router::new().route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    );
    HttpServer::start("metrics", bind, router).await
}
