use anyhow::{Context, Result};
use axum::middleware;
use stipple_engine::{Gateway, GatewayConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::middleware::{create_trace_layer, request_logger};
use super::routes::create_router;
use super::AppState;

/// Serves until Ctrl+C or SIGTERM.
pub async fn start_server(gateway: Gateway, config: &GatewayConfig) -> Result<()> {
    let app = create_router(AppState::new(gateway, &config.web_root))
        .layer(middleware::from_fn(request_logger))
        .layer(create_trace_layer());

    let listener = TcpListener::bind(config.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let addr = listener.local_addr().context("failed to read bound address")?;
    info!(
        addr = %addr,
        web_root = %config.web_root.display(),
        image_dir = %config.image_dir.display(),
        events_path = %config.events_path().display(),
        "HTTP server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = wait_for_sigterm() => info!("received SIGTERM"),
    }
    info!("starting graceful shutdown");
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
