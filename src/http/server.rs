//! Start/stop handle shared by every HTTP sub-service.
//!
//! # Responsibilities
//! - Bind the listener up front so address errors surface at start
//! - Serve an Axum router on a background task
//! - Graceful stop, or forced close when the stop context is cancelled

use axum::Router;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Errors from starting or stopping an HTTP server.
#[derive(Debug, Error)]
pub enum HttpServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] JoinError),
}

/// A running HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    name: &'static str,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl HttpServer {
    /// Bind `bind` and start serving `router` in the background.
    pub async fn start(
        name: &'static str,
        bind: &str,
        router: Router,
    ) -> Result<Self, HttpServerError> {
        let bind_err = |source| HttpServerError::Bind {
            addr: bind.to_string(),
            source,
        };
        let listener = TcpListener::bind(bind).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
        });

        tracing::debug!(server = name, address = %addr, "HTTP server listening");

        Ok(Self {
            name,
            addr,
            shutdown,
            task: Some(task),
        })
    }

    /// The bound address (resolves port 0 to the real port).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    ///
    /// If `ctx` is or becomes cancelled, the drain is abandoned and the
    /// server task is aborted. Calling `stop` again is a no-op.
    pub async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), HttpServerError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        self.shutdown.cancel();

        let result = tokio::select! {
            biased;
            res = &mut task => res,
            _ = ctx.cancelled() => {
                tracing::warn!(server = self.name, "Forcing HTTP server closed");
                task.abort();
                task.await
            }
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HttpServerError::Serve(e)),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(HttpServerError::Join(e)),
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
