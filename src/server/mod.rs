//! Server startup and shutdown

pub(crate) mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api;
use crate::config::Config;
use crate::recorder::ObsConnector;

pub use service::SessionService;

/// Bind the configured address and serve until SIGINT/SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let paths = config.resolve_paths()?;
    info!("Dataset root: {:?}", paths.dataset_root);
    info!("Video output: {:?}", paths.video_output);

    let connector = Arc::new(ObsConnector::new(&config.obs));
    let service = Arc::new(SessionService::new(&config, &paths, connector));

    if service.connect_recorder().await {
        info!("Connected to OBS at {}:{}", config.obs.host, config.obs.port);
    } else {
        warn!(
            "OBS not reachable at {}:{}; will retry on first recording",
            config.obs.host, config.obs.port
        );
    }

    let app = api::router(service);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("collect-server listening on http://{}", addr);
    info!("   WebSocket: ws://{}/ws", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
