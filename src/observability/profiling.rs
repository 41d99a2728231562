//! CPU profiling.
//!
//! # Responsibilities
//! - Serve on-demand CPU flamegraphs at `GET /debug/pprof/profile`
//! - Optionally sample from startup and write a flamegraph on shutdown
//!
//! Both parts are off by default. With neither enabled, start and stop do
//! nothing.
//!
//! ```text
//! curl "http://localhost:6060/debug/pprof/profile?seconds=10&frequency=200" > cpu.svg
//! ```

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::Query,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{PprofConfig, ProfileType};
use crate::http::{HttpServer, HttpServerError};

const DEFAULT_SECONDS: u64 = 30;
/// Longest on-demand capture; the profiler is process-global while it runs.
const MAX_SECONDS: u64 = 60;
const DEFAULT_FREQUENCY: i32 = 100;
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

#[derive(Debug, Error)]
pub enum ProfilingError {
    #[error("profiler error: {0}")]
    Profiler(#[from] pprof::Error),

    #[error("failed to write profile to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] HttpServerError),
}

#[derive(Debug, Deserialize)]
struct ProfileParams {
    seconds: Option<u64>,
    frequency: Option<i32>,
}

/// The profiling sub-service.
pub struct ProfilingService {
    config: PprofConfig,
    server: Option<HttpServer>,
    continuous: Option<ProfilerGuard<'static>>,
}

impl ProfilingService {
    pub fn new(config: &PprofConfig) -> Self {
        Self {
            config: config.clone(),
            server: None,
            continuous: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.listen_enabled || self.output_path().is_some()
    }

    /// Where the shutdown profile goes, if one is configured.
    pub fn output_path(&self) -> Option<PathBuf> {
        match (self.config.profile_type, &self.config.profile_dir) {
            (Some(ProfileType::Cpu), Some(dir)) => Some(dir.join(&self.config.profile_filename)),
            _ => None,
        }
    }

    pub async fn start(&mut self) -> Result<(), ProfilingError> {
        if !self.is_enabled() {
            tracing::debug!("Profiling disabled");
            return Ok(());
        }

        if let Some(path) = self.output_path() {
            let guard = ProfilerGuardBuilder::default()
                .frequency(DEFAULT_FREQUENCY)
                .blocklist(BLOCKLIST)
                .build()?;
            tracing::info!(path = %path.display(), "Started continuous CPU profile");
            self.continuous = Some(guard);
        }

        if self.config.listen_enabled {
            let server =
                HttpServer::start("pprof", &self.config.bind_address(), router()).await?;
            tracing::info!(address = %server.addr(), "Started pprof server");
            self.server = Some(server);
        }
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(HttpServer::addr)
    }

    /// Stop the endpoint and flush the continuous profile, if any. Both are
    /// attempted even if the first fails.
    pub async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), ProfilingError> {
        let served = match self.server.as_mut() {
            Some(server) => server.stop(ctx).await.map_err(ProfilingError::from),
            None => Ok(()),
        };

        let written = match (self.continuous.take(), self.output_path()) {
            (Some(guard), Some(path)) => write_flamegraph(&guard, path),
            _ => Ok(()),
        };

        served.and(written)
    }
}

impl std::fmt::Debug for ProfilingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingService")
            .field("config", &self.config)
            .field("listening", &self.server.is_some())
            .field("continuous", &self.continuous.is_some())
            .finish()
    }
}

fn router() -> Router {
    Router::new().route("/debug/pprof/profile", get(handle_profile))
}

fn write_flamegraph(guard: &ProfilerGuard<'_>, path: PathBuf) -> Result<(), ProfilingError> {
    let report = guard.report().build()?;
    let file = File::create(&path).map_err(|source| ProfilingError::Write {
        path: path.clone(),
        source,
    })?;
    report.flamegraph(file)?;
    tracing::info!(path = %path.display(), "Wrote CPU profile");
    Ok(())
}

/// Resolve the sampling frequency and capture length of a request.
fn capture_settings(params: &ProfileParams) -> Result<(i32, u64), &'static str> {
    let frequency = params.frequency.unwrap_or(DEFAULT_FREQUENCY);
    if frequency <= 0 {
        return Err("frequency must be positive");
    }
    let seconds = params.seconds.unwrap_or(DEFAULT_SECONDS).min(MAX_SECONDS);
    Ok((frequency, seconds))
}

async fn handle_profile(Query(params): Query<ProfileParams>) -> Response {
    let (frequency, seconds) = match capture_settings(&params) {
        Ok(settings) => settings,
        Err(reason) => return (StatusCode::BAD_REQUEST, reason).into_response(),
    };

    match capture_flamegraph(frequency, seconds).await {
        Ok(svg) => (StatusCode::OK, [(CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Profile capture failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn capture_flamegraph(frequency: i32, seconds: u64) -> Result<Vec<u8>, ProfilingError> {
    let guard = ProfilerGuardBuilder::default()
        .frequency(frequency)
        .blocklist(BLOCKLIST)
        .build()?;

    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let mut svg = Vec::new();
    guard.report().build()?.flamegraph(&mut svg)?;
    Ok(svg)
}
