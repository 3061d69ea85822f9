//! The `serve` command: run the HTTP bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::routes;

/// Starts the HTTP server and runs until Ctrl-C or SIGTERM.
pub async fn run(config: &ServerConfig, listen: Option<SocketAddr>) -> ServerResult<()> {
    let backend = Backend::from_config(config)?;
    let status = backend.credentials.status();
    let state = backend.into_state(config)?;
    let app = routes::router(Arc::new(state));

    let addr = listen.unwrap_or(config.listen);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %listener.local_addr()?,
        calendar = %config.calendar_id,
        credentials = status.as_str(),
        "calbridge listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
