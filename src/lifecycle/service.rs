//! Service orchestration.
//!
//! # Responsibilities
//! - Bring sub-services up in a fixed order: metrics, profiling, RPC, driver
//! - Tear them down in the order driver, RPC, profiling, metrics
//! - Keep a registered metrics sink drained, whether or not it is scraped
//! - Aggregate shutdown failures without skipping any step
//! - Enforce single start and terminal stop
//!
//! # Design Decisions
//! - A failed `start` does not roll back; the caller is expected to `stop`
//!   (or `kill`) to release what did come up
//! - The stopped flag only flips when every step succeeded, so a failed
//!   `stop` can be retried; steps that already succeeded are not repeated
//! - No timeouts here; a cancelled stop context is the force-close signal

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::components::ServiceComponents;
use crate::lifecycle::driver::{Driver, Metricer};
use crate::lifecycle::error::{ServiceError, Stage, StopErrors};
use crate::observability::metrics::{start_server, UpkeepTask, UPKEEP_INTERVAL};
use crate::observability::profiling::ProfilingService;
use crate::rpc::{RpcModule, RpcServer};

/// Owns every sub-service of the process.
pub struct ServiceLifecycle {
    version: String,
    config: ServiceConfig,

    driver: Option<Arc<dyn Driver>>,
    metrics: Option<Arc<dyn Metricer>>,
    rpc_groups: Vec<RpcModule>,

    metrics_server: Option<HttpServer>,
    metrics_upkeep: Option<UpkeepTask>,
    pprof: Option<ProfilingService>,
    rpc_server: Option<RpcServer>,
    driver_stopped: bool,

    started: bool,
    stopped: bool,
}

impl ServiceLifecycle {
    pub fn new(version: impl Into<String>, config: ServiceConfig, components: ServiceComponents) -> Self {
        let ServiceComponents {
            driver,
            metrics,
            rpc_groups,
        } = components;

        Self {
            version: version.into(),
            config,
            driver,
            metrics,
            rpc_groups,
            metrics_server: None,
            metrics_upkeep: None,
            pprof: None,
            rpc_server: None,
            driver_stopped: false,
            started: false,
            stopped: false,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether the service as a whole has stopped. Terminal.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_server.as_ref().map(HttpServer::addr)
    }

    pub fn pprof_addr(&self) -> Option<SocketAddr> {
        self.pprof.as_ref().and_then(ProfilingService::local_addr)
    }

    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_server.as_ref().and_then(RpcServer::local_addr)
    }

    /// Start every registered sub-service, then the driver.
    ///
    /// Returns the first failure tagged with its stage. Anything started
    /// before the failure keeps running.
    pub async fn start(&mut self, ctx: &CancellationToken) -> Result<(), ServiceError> {
        if self.stopped {
            return Err(ServiceError::AlreadyStopped);
        }
        if self.started {
            return Err(ServiceError::AlreadyStarted);
        }
        self.started = true;
        tracing::info!(version = %self.version, "Starting");

        if let Some(metrics) = self.metrics.clone() {
            self.metrics_upkeep = Some(UpkeepTask::spawn(metrics.clone(), UPKEEP_INTERVAL));
            self.start_metrics_server(metrics.as_ref()).await?;
        }

        self.start_pprof().await?;

        if !self.rpc_groups.is_empty() {
            self.start_rpc_server().await?;
        }

        if let Some(driver) = &self.driver {
            driver
                .start(ctx)
                .await
                .map_err(|e| ServiceError::start(Stage::Driver, e))?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_info(&self.version);
            metrics.record_up();
        }

        tracing::info!("Started");
        Ok(())
    }

    async fn start_metrics_server(&mut self, metrics: &dyn Metricer) -> Result<(), ServiceError> {
        let config = &self.config.metrics;
        if !config.enabled {
            tracing::info!("Metrics disabled");
            return Ok(());
        }

        tracing::debug!(
            addr = %config.listen_addr,
            port = config.port,
            "Starting metrics service"
        );
        let server = start_server(metrics.handle(), &config.bind_address())
            .await
            .map_err(|e| ServiceError::start(Stage::Metrics, e))?;
        tracing::info!(addr = %server.addr(), "Started metrics service");
        self.metrics_server = Some(server);
        Ok(())
    }

    async fn start_pprof(&mut self) -> Result<(), ServiceError> {
        let mut pprof = ProfilingService::new(&self.config.pprof);
        pprof
            .start()
            .await
            .map_err(|e| ServiceError::start(Stage::Profiling, e))?;
        self.pprof = Some(pprof);
        Ok(())
    }

    async fn start_rpc_server(&mut self) -> Result<(), ServiceError> {
        let groups = std::mem::take(&mut self.rpc_groups);
        let mut server = RpcServer::new(&self.config.rpc, &self.version, groups);
        server
            .start()
            .await
            .map_err(|e| ServiceError::start(Stage::Rpc, e))?;
        self.rpc_server = Some(server);
        Ok(())
    }

    /// Stop everything that is running.
    ///
    /// Each step is attempted even if an earlier one failed; all failures are
    /// returned together. A cancelled `ctx` forces sub-services closed.
    pub async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), ServiceError> {
        if self.stopped {
            return Err(ServiceError::AlreadyStopped);
        }
        tracing::info!("Service stopping");

        let mut errors = StopErrors::default();

        if let Some(driver) = &self.driver {
            if !self.driver_stopped {
                match driver.stop(ctx).await {
                    Ok(()) => self.driver_stopped = true,
                    Err(e) => errors.push("driver", e),
                }
            }
        }

        if let Some(mut server) = self.rpc_server.take() {
            if let Err(e) = server.stop(ctx).await {
                errors.push("RPC service", e);
                self.rpc_server = Some(server);
            }
        }

        if let Some(mut pprof) = self.pprof.take() {
            if let Err(e) = pprof.stop(ctx).await {
                errors.push("PProf service", e);
                self.pprof = Some(pprof);
            }
        }

        if let Some(mut server) = self.metrics_server.take() {
            if let Err(e) = server.stop(ctx).await {
                errors.push("metrics service", e);
                self.metrics_server = Some(server);
            }
        }

        if let Some(mut upkeep) = self.metrics_upkeep.take() {
            if let Err(e) = upkeep.stop(ctx).await {
                errors.push("metrics upkeep", e);
                self.metrics_upkeep = Some(upkeep);
            }
        }

        if !errors.is_empty() {
            return Err(ServiceError::Stop(errors));
        }

        self.stopped = true;
        tracing::info!("Service stopped");
        Ok(())
    }

    /// Stop without graceful drain.
    pub async fn kill(&mut self) -> Result<(), ServiceError> {
        let ctx = CancellationToken::new();
        ctx.cancel();
        self.stop(&ctx).await
    }
}

impl std::fmt::Debug for ServiceLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLifecycle")
            .field("version", &self.version)
            .field("driver", &self.driver.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::error::BoxError;
    use crate::config::ProfileType;
    use crate::observability::metrics::Metrics;
    use metrics_exporter_prometheus::PrometheusHandle;
    use std::time::Duration;
    use crate::rpc::{Params, RpcError, ADMIN_NAMESPACE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDriver {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_stop: AtomicBool,
    }

    #[async_trait]
    impl Driver for CountingDriver {
        async fn start(&self, _ctx: &CancellationToken) -> Result<(), BoxError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self, _ctx: &CancellationToken) -> Result<(), BoxError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err("stuck".into());
            }
            Ok(())
        }
    }

    /// Real registry that counts how often upkeep ran.
    struct UpkeepCounter {
        inner: Metrics,
        upkeeps: AtomicUsize,
    }

    impl Metricer for UpkeepCounter {
        fn handle(&self) -> PrometheusHandle {
            self.inner.handle()
        }
        fn record_info(&self, version: &str) {
            self.inner.record_info(version);
        }
        fn record_up(&self) {
            self.inner.record_up();
        }
        fn run_upkeep(&self) {
            self.upkeeps.fetch_add(1, Ordering::SeqCst);
            self.inner.run_upkeep();
        }
    }

    fn local_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.metrics.listen_addr = "127.0.0.1".to_string();
        config.metrics.port = 0;
        config.rpc.listen_addr = "127.0.0.1".to_string();
        config.rpc.port = 0;
        config
    }

    fn ping_group(namespace: &str) -> RpcModule {
        RpcModule::new(namespace).register("ping", |_params: Params| async {
            Ok::<_, RpcError>("pong")
        })
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let driver = Arc::new(CountingDriver::default());
        let components = ServiceComponents::new().with_driver(driver.clone());
        let mut service = ServiceLifecycle::new("v1", local_config(), components);

        let ctx = CancellationToken::new();
        service.start(&ctx).await.unwrap();
        assert_eq!(driver.starts.load(Ordering::SeqCst), 1);

        service.stop(&ctx).await.unwrap();
        assert!(service.stopped());
        assert!(matches!(
            service.stop(&ctx).await,
            Err(ServiceError::AlreadyStopped)
        ));
        assert_eq!(driver.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_guards() {
        let mut service = ServiceLifecycle::new("v1", local_config(), ServiceComponents::new());
        let ctx = CancellationToken::new();

        service.start(&ctx).await.unwrap();
        assert!(matches!(
            service.start(&ctx).await,
            Err(ServiceError::AlreadyStarted)
        ));

        service.stop(&ctx).await.unwrap();
        assert!(matches!(
            service.start(&ctx).await,
            Err(ServiceError::AlreadyStopped)
        ));
    }

    #[tokio::test]
    async fn test_failed_stop_can_be_retried() {
        let driver = Arc::new(CountingDriver::default());
        driver.fail_stop.store(true, Ordering::SeqCst);
        let components = ServiceComponents::new()
            .with_driver(driver.clone())
            .with_rpc_methods(ping_group("test"));
        let mut service = ServiceLifecycle::new("v1", local_config(), components);

        let ctx = CancellationToken::new();
        service.start(&ctx).await.unwrap();
        let rpc_addr = service.rpc_addr().unwrap();

        let err = service.stop(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to stop driver: stuck");
        assert!(!service.stopped());
        // Later steps still ran.
        assert!(service.rpc_addr().is_none());
        assert!(tokio::net::TcpStream::connect(rpc_addr).await.is_err());

        driver.fail_stop.store(false, Ordering::SeqCst);
        service.stop(&ctx).await.unwrap();
        assert!(service.stopped());
        assert_eq!(driver.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metrics_sink_records_up_and_serves() {
        let mut config = local_config();
        config.metrics.enabled = true;
        let metrics = Arc::new(Metrics::new("svc"));
        let components = ServiceComponents::new().with_metrics_sink(metrics.clone());
        let mut service = ServiceLifecycle::new("v9.9.9", config, components);

        service.start(&CancellationToken::new()).await.unwrap();
        let rendered = metrics.render();
        assert!(rendered.contains("chainwatch_svc_up 1"));
        assert!(rendered.contains("version=\"v9.9.9\""));
        assert!(service.metrics_addr().is_some());

        service.kill().await.unwrap();
        assert!(service.stopped());
    }

    #[tokio::test]
    async fn test_metrics_sink_with_endpoint_disabled() {
        let metrics = Arc::new(Metrics::new("quiet"));
        let components = ServiceComponents::new().with_metrics_sink(metrics.clone());
        let mut service = ServiceLifecycle::new("v1", local_config(), components);

        service.start(&CancellationToken::new()).await.unwrap();
        assert!(service.metrics_addr().is_none());
        assert!(metrics.render().contains("chainwatch_quiet_up 1"));
        service.kill().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscraped_sink_is_drained_until_stop() {
        let sink = Arc::new(UpkeepCounter {
            inner: Metrics::new("drain"),
            upkeeps: AtomicUsize::new(0),
        });
        let components = ServiceComponents::new().with_metrics_sink(sink.clone());
        let mut service = ServiceLifecycle::new("v1", local_config(), components);

        let ctx = CancellationToken::new();
        service.start(&ctx).await.unwrap();
        assert!(service.metrics_addr().is_none());

        for _ in 0..10_000 {
            sink.inner.record_tx_sent(Duration::from_millis(3));
        }
        tokio::time::sleep(UPKEEP_INTERVAL * 2 + UPKEEP_INTERVAL / 2).await;
        assert_eq!(sink.upkeeps.load(Ordering::SeqCst), 2);

        service.stop(&ctx).await.unwrap();
        tokio::time::sleep(UPKEEP_INTERVAL * 4).await;
        assert_eq!(sink.upkeeps.load(Ordering::SeqCst), 2);

        let rendered = sink.inner.render();
        assert!(rendered.contains("chainwatch_drain_tx_confirm_duration_seconds_count 10000"));
    }

    #[tokio::test]
    async fn test_every_stop_failure_reported() {
        let missing = tempfile::tempdir().unwrap().path().join("gone");
        let mut config = local_config();
        config.pprof.profile_type = Some(ProfileType::Cpu);
        config.pprof.profile_dir = Some(missing);

        let driver = Arc::new(CountingDriver::default());
        driver.fail_stop.store(true, Ordering::SeqCst);
        let components = ServiceComponents::new().with_driver(driver.clone());
        let mut service = ServiceLifecycle::new("v1", config, components);

        let ctx = CancellationToken::new();
        service.start(&ctx).await.unwrap();

        let err = service.stop(&ctx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Stop(_)));
        let message = err.to_string();
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 2, "{}", message);
        assert_eq!(lines[0], "failed to stop driver: stuck");
        assert!(lines[1].starts_with("failed to stop PProf service: failed to write profile"));
        assert!(!service.stopped());

        driver.fail_stop.store(false, Ordering::SeqCst);
        service.stop(&ctx).await.unwrap();
        assert!(service.stopped());
    }

    #[tokio::test]
    async fn test_rpc_failure_names_stage() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = local_config();
        config.rpc.port = taken.local_addr().unwrap().port();

        let driver = Arc::new(CountingDriver::default());
        let components = ServiceComponents::new()
            .with_driver(driver.clone())
            .with_rpc_methods(ping_group("test"))
            .with_rpc_methods(ping_group(ADMIN_NAMESPACE));
        let mut service = ServiceLifecycle::new("v1", config, components);

        let err = service.start(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Rpc));
        assert_eq!(driver.starts.load(Ordering::SeqCst), 0);

        service.kill().await.unwrap();
        assert!(service.stopped());
    }
}
