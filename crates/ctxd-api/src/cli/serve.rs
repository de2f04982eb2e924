//! `ctxd serve`: run the HTTP server with its background sweepers.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use ctxd_types::config::ServerConfig;

use crate::http::router::build_router;
use crate::state::AppState;

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;
    let shutdown = CancellationToken::new();
    let sweepers = TaskTracker::new();

    if let Some(ttl) = state.config.locks.idle_ttl() {
        let locks = state.completion.locks().clone();
        sweepers.spawn(locks.run_eviction(ttl, state.config.locks.sweep_interval(), shutdown.clone()));
    }
    if state.config.cleanup_interval_secs > 0 {
        sweepers.spawn(run_session_cleanup(
            state.clone(),
            Duration::from_secs(state.config.cleanup_interval_secs),
            shutdown.clone(),
        ));
    }
    sweepers.close();

    let listener = tokio::net::TcpListener::bind(&state.config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "ctxd listening");

    let router = build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(pending = state.completion.updater().pending(), "shutting down");
    shutdown.cancel();
    sweepers.wait().await;
    state.completion.drain().await;
    tracing::info!("server stopped");
    Ok(())
}

/// Periodically purge expired sessions until `shutdown` is cancelled.
async fn run_session_cleanup(state: AppState, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match state.completion.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "purged expired sessions"),
                    Err(e) => tracing::warn!(error = %e, "expired session cleanup failed"),
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
