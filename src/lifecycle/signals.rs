//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT
//! - Turn a second signal during shutdown into a forced stop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - On non-unix targets only Ctrl-C is observed

use tokio_util::sync::CancellationToken;

/// Resolve when the process is asked to terminate.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Token that is cancelled on the next termination signal.
///
/// Used as the stop context once shutdown has begun, so a repeated signal
/// abandons graceful drain.
pub fn force_on_next_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let forced = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Second signal received, forcing shutdown");
        forced.cancel();
    });
    token
}
